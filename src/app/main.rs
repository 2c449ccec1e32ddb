use pocketcore::joypad::JoypadButtons;
use sdl2::ttf::Font;
use std::{env, path::Path, thread, time::{Duration, Instant}};

mod constants;
mod sdl_setup;
mod drawing;
mod input;
mod emulator;

use emulator::Emulator;

fn main() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <rom_path>", args[0]);
        std::process::exit(1);
    }
    let rom_path = Path::new(&args[1]);
    let rom_filename = rom_path.file_name().unwrap_or_default().to_string_lossy();
    let window_title = format!("Rust GB Emu - {}", rom_filename);

    let mut sdl_context = sdl_setup::init_sdl(&window_title)?;

    println!("Loading font: {}...", constants::FONT_PATH);
    let font_path = Path::new(constants::FONT_PATH);
    if !font_path.exists() {
        return Err(format!("Font file not found: {}", constants::FONT_PATH));
    }
    let font: Font = sdl_context.ttf_context
        .load_font(font_path, constants::DEBUG_FONT_SIZE)?;
    println!("Font loaded successfully.");

    let mut emulator = Emulator::new(rom_path, true)?;
    let mut buttons = JoypadButtons::default();

    let gb_screen_x = 0;
    let gb_screen_y = 0;
    let disasm_pane_x = (constants::GB_SCREEN_WIDTH + constants::PADDING) as i32;
    let disasm_pane_y = 0;
    let far_right_pane_x = disasm_pane_x + constants::DISASM_AREA_WIDTH as i32 + constants::PADDING as i32;
    let vram_view_y = 0;
    let input_view_y = constants::VRAM_VIEW_HEIGHT as i32 + constants::PADDING as i32;

    let mut p_key_pressed_last_frame = false;
    let mut n_key_pressed_last_frame = false;

    println!("Starting main loop...");
    'main_loop: loop {
        let frame_start_time = Instant::now();

        if input::handle_input(&mut sdl_context.event_pump, &mut buttons) {
            break 'main_loop;
        }
        emulator.gameboy.set_input(buttons);

        let keyboard_state = sdl_context.event_pump.keyboard_state();
        let p_key_currently_pressed = keyboard_state.is_scancode_pressed(sdl2::keyboard::Scancode::P);
        let n_key_currently_pressed = keyboard_state.is_scancode_pressed(sdl2::keyboard::Scancode::N);

        let mut step_executed_this_iteration = false;

        if p_key_currently_pressed && !p_key_pressed_last_frame {
            emulator.toggle_stepping();
        }

        if emulator.stepping && n_key_currently_pressed && !n_key_pressed_last_frame {
            println!("Executing one step...");
            if let Err(e) = emulator.step_instruction() {
                eprintln!("Emulator Step Error: {}", e);
            }
            step_executed_this_iteration = true;
        }

        p_key_pressed_last_frame = p_key_currently_pressed;
        n_key_pressed_last_frame = n_key_currently_pressed;

        if !emulator.stepping {
            if let Err(e) = emulator.run_frame() {
                eprintln!("Emulator Error: {}", e);
                break 'main_loop;
            }
        }

        emulator.gameboy.update_vram_debug();
        let gameboy = &emulator.gameboy;

        sdl_context.canvas.set_draw_color(constants::DEBUG_BACKGROUND_COLOR);
        sdl_context.canvas.clear();

        let frame = gameboy.frame();
        drawing::draw_gb_screen(&mut sdl_context.canvas, frame.buffer, gb_screen_x, gb_screen_y);

        if let Err(e) = drawing::draw_disassembly_debug(
            &mut sdl_context.canvas,
            &sdl_context.texture_creator,
            &font,
            gameboy.cpu(),
            gameboy.bus(),
            disasm_pane_x,
            disasm_pane_y,
        ) {
            eprintln!("Error drawing disassembly: {}", e);
        }

        drawing::draw_vram_debug(
            &mut sdl_context.canvas,
            gameboy.ppu().get_vram_debug_buffer(),
            far_right_pane_x,
            vram_view_y,
        );

        drawing::draw_input_debug(
            &mut sdl_context.canvas,
            &gameboy.bus().joypad.state(),
            far_right_pane_x,
            input_view_y,
        );

        sdl_context.canvas.present();

        if !emulator.stepping {
            let elapsed_time = frame_start_time.elapsed();
            if elapsed_time < constants::TARGET_FRAME_DURATION {
                let sleep_duration = constants::TARGET_FRAME_DURATION.saturating_sub(elapsed_time);
                if sleep_duration > Duration::from_millis(1) {
                    thread::sleep(sleep_duration.saturating_sub(Duration::from_millis(1)));
                }
                while Instant::now() < frame_start_time + constants::TARGET_FRAME_DURATION {
                    thread::yield_now();
                }
            }
        } else if !step_executed_this_iteration {
            thread::sleep(Duration::from_millis(5));
        }
    }

    println!("Emulator stopped.");
    Ok(())
}
