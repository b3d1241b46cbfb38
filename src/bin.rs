use clap::{arg, command, value_parser, ArgAction};
use log::error;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::exit;

use outworld::machine::{GamePart, Machine, UserInput};
use outworld::resfile::DiskRepository;
use outworld::Host;

/// Host adapter: queues frame notifications so the render loop can
/// present them after `run_tic` returns.
#[derive(Default)]
struct FrameSink {
    frames: VecDeque<(usize, u32)>,
}

impl Host for FrameSink {
    fn on_frame_ready(&mut self, buffer_index: usize, delay_ms: u32) {
        self.frames.push_back((buffer_index, delay_ms));
    }
}

#[cfg(feature = "desktop")]
fn run(machine: &mut Machine<DiskRepository, FrameSink>, scale: u32) {
    use outworld::definitions::{SCREEN_HEIGHT, SCREEN_WIDTH};
    use outworld::keyboard::{apply_key, key_for_name};
    use sdl2::audio::{AudioCallback, AudioSpecDesired};
    use sdl2::event::Event;
    use sdl2::pixels::PixelFormatEnum;
    use std::time::Duration;

    struct MixerCallback {
        handle: outworld::audio::AudioHandle,
        frequency: u32,
    }

    impl AudioCallback for MixerCallback {
        type Channel = i8;

        fn callback(&mut self, out: &mut [i8]) {
            self.handle.mix(out, self.frequency);
        }
    }

    let logical_width = SCREEN_WIDTH as u32;
    let logical_height = SCREEN_HEIGHT as u32;

    let sdl_context = sdl2::init().unwrap();
    let video_subsystem = sdl_context.video().unwrap();
    let audio_subsystem = sdl_context.audio().unwrap();

    let window = video_subsystem
        .window(
            "Another World",
            logical_width * scale,
            logical_height * scale,
        )
        .position_centered()
        .resizable()
        .build()
        .unwrap();

    let mut canvas = window.into_canvas().build().unwrap();
    let texture_creator = canvas.texture_creator();
    let mut frame_texture = texture_creator
        .create_texture_streaming(PixelFormatEnum::RGBA32, logical_width, logical_height)
        .unwrap();

    // only scale by integers instead of fractions to keep everything crisp
    canvas.set_integer_scale(true).unwrap();
    canvas
        .set_logical_size(logical_width, logical_height)
        .unwrap();

    let desired = AudioSpecDesired {
        freq: Some(22050),
        channels: Some(1),
        samples: Some(1024),
    };
    let device = audio_subsystem
        .open_playback(None, &desired, |spec| MixerCallback {
            handle: machine.audio_handle(),
            frequency: spec.freq as u32,
        })
        .unwrap();
    device.resume();

    let mut event_pump = sdl_context.event_pump().unwrap();
    let mut input = UserInput::default();

    'running: loop {
        input.last_char = None;
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => break 'running,
                Event::KeyDown {
                    keycode: Some(keycode),
                    ..
                } => {
                    let name = keycode.name();
                    if let Some(key) = key_for_name(&name) {
                        apply_key(&mut input, key, true);
                    }
                    if name.len() == 1 {
                        input.last_char = name.chars().next();
                    } else if name == "Backspace" {
                        input.last_char = Some('\u{8}');
                    }
                }
                Event::KeyUp {
                    keycode: Some(keycode),
                    ..
                } => {
                    if let Some(key) = key_for_name(&keycode.name()) {
                        apply_key(&mut input, key, false);
                    }
                }
                _ => {}
            }
        }

        if let Err(e) = machine.run_tic(&input) {
            error!("machine stopped: {}", e);
            break 'running;
        }
        // The request is level-triggered on key presses, not held state.
        input.show_password_screen = false;

        let frames: Vec<_> = machine.host_mut().frames.drain(..).collect();
        for (buffer_index, delay_ms) in frames {
            let rgba = match machine.video().frame_rgba(buffer_index) {
                Ok(rgba) => rgba,
                Err(e) => {
                    error!("cannot present frame: {}", e);
                    break 'running;
                }
            };
            frame_texture
                .update(None, &rgba, SCREEN_WIDTH * 4)
                .unwrap();
            canvas.clear();
            canvas.copy(&frame_texture, None, None).unwrap();
            canvas.present();
            // The bytecode owns the pacing; the host owns the sleep.
            std::thread::sleep(Duration::from_millis(delay_ms as u64));
        }
    }
}

#[cfg(not(feature = "desktop"))]
fn run(machine: &mut Machine<DiskRepository, FrameSink>, _scale: u32) {
    use log::info;

    println!("You are running in headless mode!");
    println!("Rebuild with the desktop feature enabled to get a window.");
    let input = UserInput::default();
    for tic in 0..1000u32 {
        if let Err(e) = machine.run_tic(&input) {
            error!("machine stopped after {} tics: {}", tic, e);
            exit(1);
        }
    }
    let frames = machine.host_mut().frames.len();
    info!("ran 1000 tics, {} frames produced", frames);
}

fn main() {
    env_logger::init();

    let dir_arg = arg!([dir] "The directory with MEMLIST.BIN and the BANK files")
        .required(true)
        .value_parser(value_parser!(PathBuf));

    let part_arg = arg!(-p --part <PART> "The game part to boot into (16000-16008)")
        .value_parser(value_parser!(u16))
        .default_value("16001");

    let scale_arg = arg!(-s --scale <SCALE> "Integer window scale")
        .value_parser(value_parser!(u32))
        .default_value("4");

    let bypass_arg =
        arg!(--bypass "Skip the code-wheel check of the copy protection").action(ArgAction::SetTrue);

    let matches = command!()
        .arg(dir_arg)
        .arg(part_arg)
        .arg(scale_arg)
        .arg(bypass_arg)
        .get_matches();

    let dir = matches.get_one::<PathBuf>("dir").unwrap();
    let part_id = *matches.get_one::<u16>("part").unwrap();
    let scale = *matches.get_one::<u32>("scale").unwrap();
    let bypass = *matches.get_one::<bool>("bypass").unwrap();

    let part = match GamePart::from_id(part_id) {
        Some(part) => part,
        None => {
            println!("{} is not a game part id", part_id);
            exit(1);
        }
    };

    let repository = match DiskRepository::open(dir) {
        Ok(repository) => repository,
        Err(e) => {
            println!("cannot open game data in {}: {}", dir.display(), e);
            exit(1);
        }
    };

    let mut machine = match Machine::new(repository, FrameSink::default()) {
        Ok(machine) => machine,
        Err(e) => {
            println!("cannot start the machine: {}", e);
            exit(1);
        }
    };

    if bypass {
        machine.bypass_copy_protection();
    }
    machine.schedule_part(part);

    run(&mut machine, scale);
}
