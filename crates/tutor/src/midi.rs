use std::sync::mpsc::{self, Receiver};

use anyhow::{anyhow, Result};
use midir::{Ignore, MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use keylight_domain::{Key, KeyAction, KeyEvent};

const CLIENT_NAME: &str = "keylight";
const FORWARD_VELOCITY: u8 = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MidiDevice {
    pub index: usize,
    pub name: String,
}

/// Blocking source of live key events, consumed one at a time in arrival order.
pub trait InputSource {
    /// Next event, or `None` once the device is gone.
    fn next_event(&mut self) -> Option<KeyEvent>;
}

impl InputSource for Receiver<KeyEvent> {
    fn next_event(&mut self) -> Option<KeyEvent> {
        self.recv().ok()
    }
}

/// Device that replays guide notes while tutoring.
pub trait OutputSink: Send {
    fn send(&mut self, event: KeyEvent) -> Result<()>;
}

pub struct MidiManager;

impl MidiManager {
    pub fn list_inputs() -> Result<Vec<MidiDevice>> {
        let input = MidiInput::new(CLIENT_NAME)?;
        Ok(devices(&input))
    }

    pub fn list_outputs() -> Result<Vec<MidiDevice>> {
        let output = MidiOutput::new(CLIENT_NAME)?;
        Ok(devices(&output))
    }

    /// Connects to the input port chosen by index or name. Decoded key events
    /// arrive on the returned receiver for as long as the connection is kept.
    pub fn open_input(selector: &str) -> Result<(MidiInputConnection<()>, Receiver<KeyEvent>)> {
        let mut input = MidiInput::new(CLIENT_NAME)?;
        input.ignore(Ignore::All);
        let port = find_port(&input, selector)?;
        let name = input.port_name(&port).unwrap_or_else(|_| selector.to_string());
        let (tx, rx) = mpsc::channel();
        let connection = input
            .connect(
                &port,
                "keylight-in",
                move |_stamp, message, _| {
                    if let Some(event) = decode_key_event(message) {
                        let _ = tx.send(event);
                    }
                },
                (),
            )
            .map_err(|e| anyhow!(format!("midi connect error: {e:?}")))?;
        info!(port = %name, "listening for live input");
        Ok((connection, rx))
    }

    pub fn open_output(selector: &str) -> Result<MidiForwarder> {
        let output = MidiOutput::new(CLIENT_NAME)?;
        let port = find_port(&output, selector)?;
        let name = output.port_name(&port).unwrap_or_else(|_| selector.to_string());
        let connection = output
            .connect(&port, "keylight-out")
            .map_err(|e| anyhow!(format!("midi connect error: {e:?}")))?;
        info!(port = %name, "forwarding playback");
        Ok(MidiForwarder { connection })
    }
}

fn devices<T: MidiIO>(io: &T) -> Vec<MidiDevice> {
    io.ports()
        .iter()
        .enumerate()
        .map(|(index, port)| MidiDevice {
            index,
            name: io.port_name(port).unwrap_or_else(|_| "Unknown".into()),
        })
        .collect()
}

/// Resolves a port by numeric index, exact name, or name fragment.
fn find_port<T: MidiIO>(io: &T, selector: &str) -> Result<T::Port> {
    let ports = io.ports();
    if let Ok(index) = selector.parse::<usize>() {
        return ports
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("midi port {index} not found ({} available)", ports.len()));
    }
    let names: Vec<String> = ports
        .iter()
        .map(|port| io.port_name(port).unwrap_or_default())
        .collect();
    let position = names
        .iter()
        .position(|name| name == selector)
        .or_else(|| names.iter().position(|name| name.contains(selector)))
        .ok_or_else(|| anyhow!("midi port {selector:?} not found"))?;
    Ok(ports[position].clone())
}

/// Decodes a raw MIDI message into a key event. A note-on with velocity 0 is a
/// release; everything else is ignored.
pub fn decode_key_event(message: &[u8]) -> Option<KeyEvent> {
    let [status, code, velocity, ..] = *message else {
        return None;
    };
    let action = match status & 0xF0 {
        0x90 if velocity > 0 => KeyAction::Press,
        0x90 | 0x80 => KeyAction::Release,
        _ => return None,
    };
    match Key::new(code) {
        Ok(key) => Some(KeyEvent { action, key }),
        Err(_) => {
            warn!(code, "dropping live note outside the key range");
            None
        }
    }
}

/// Raw MIDI bytes for a forwarded key event on channel 0.
pub fn encode_key_event(event: KeyEvent) -> [u8; 3] {
    match event.action {
        KeyAction::Press => [0x90, event.key.code(), FORWARD_VELOCITY],
        KeyAction::Release => [0x80, event.key.code(), 0],
    }
}

pub struct MidiForwarder {
    connection: MidiOutputConnection,
}

impl OutputSink for MidiForwarder {
    fn send(&mut self, event: KeyEvent) -> Result<()> {
        debug!(key = %event.key, action = ?event.action, "forwarding");
        self.connection
            .send(&encode_key_event(event))
            .map_err(|e| anyhow!(format!("midi send error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: u8) -> Key {
        Key::new(code).unwrap()
    }

    #[test]
    fn list_inputs_does_not_panic() {
        // MIDI availability varies by environment; just ensure no panic.
        let _ = MidiManager::list_inputs();
        let _ = MidiManager::list_outputs();
    }

    #[test]
    fn decodes_note_messages_on_any_channel() {
        assert_eq!(decode_key_event(&[0x90, 60, 100]), Some(KeyEvent::press(key(60))));
        assert_eq!(decode_key_event(&[0x93, 61, 1]), Some(KeyEvent::press(key(61))));
        assert_eq!(decode_key_event(&[0x90, 60, 0]), Some(KeyEvent::release(key(60))));
        assert_eq!(decode_key_event(&[0x85, 60, 40]), Some(KeyEvent::release(key(60))));
    }

    #[test]
    fn ignores_other_and_short_messages() {
        assert_eq!(decode_key_event(&[0xB0, 64, 127]), None);
        assert_eq!(decode_key_event(&[0xF8]), None);
        assert_eq!(decode_key_event(&[0x90, 60]), None);
        assert_eq!(decode_key_event(&[0x90, 125, 10]), None);
    }

    #[test]
    fn encodes_forwarded_events() {
        assert_eq!(encode_key_event(KeyEvent::press(key(60))), [0x90, 60, 64]);
        assert_eq!(encode_key_event(KeyEvent::release(key(64))), [0x80, 64, 0]);
    }
}
