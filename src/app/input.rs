use pocketcore::joypad::JoypadButtons;
use sdl2::EventPump;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;

fn button_for_key(key: Keycode) -> Option<fn(&mut JoypadButtons, bool)> {
    match key {
        Keycode::Right => Some(|b, v| b.right = v),
        Keycode::Left => Some(|b, v| b.left = v),
        Keycode::Up => Some(|b, v| b.up = v),
        Keycode::Down => Some(|b, v| b.down = v),
        Keycode::Z => Some(|b, v| b.a = v),
        Keycode::X => Some(|b, v| b.b = v),
        Keycode::Backspace => Some(|b, v| b.select = v),
        Keycode::Return => Some(|b, v| b.start = v),
        _ => None,
    }
}

/// Polls SDL events and updates `buttons` in place to reflect key up/down
/// transitions. Returns `true` if the quit event was received.
pub fn handle_input(event_pump: &mut EventPump, buttons: &mut JoypadButtons) -> bool {
    for event in event_pump.poll_iter() {
        match event {
            Event::Quit { .. }
            | Event::KeyDown {
                keycode: Some(Keycode::Escape),
                ..
            } => {
                println!("Exit requested.");
                return true;
            }
            Event::KeyDown {
                keycode: Some(key),
                repeat: false,
                ..
            } => {
                if let Some(setter) = button_for_key(key) {
                    setter(buttons, true);
                }
            }
            Event::KeyUp {
                keycode: Some(key),
                repeat: false,
                ..
            } => {
                if let Some(setter) = button_for_key(key) {
                    setter(buttons, false);
                }
            }
            _ => {}
        }
    }
    false
}
