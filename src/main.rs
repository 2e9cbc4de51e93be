use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use gcode_dispatch::config::Config;
use gcode_dispatch::{Console, Dispatcher, HaltFlag, HaltState, HandlerKind, OutputStream, SdCard};

const FIRMWARE_NAME: &str = "gcode-dispatch";

/// Position and mode shared by the demonstration motion handlers
#[derive(Debug, Clone, Copy, PartialEq)]
struct MotionState {
    position: [f32; 3],
    absolute: bool,
}

impl Default for MotionState {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            absolute: true,
        }
    }
}

const AXES: [char; 3] = ['X', 'Y', 'Z'];

/// Register the stand-in handlers the console answers with
fn register_handlers(dispatcher: &mut Dispatcher, halt: Arc<HaltFlag>) {
    let state = Arc::new(Mutex::new(MotionState::default()));

    for code in [0, 1] {
        let state = state.clone();
        dispatcher.add_handler(HandlerKind::GCode, code, move |gc, _| {
            if gc.arg('F').is_some_and(|f| f <= 0.0) {
                gc.set_error("feedrate must be positive");
                return true;
            }
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            for (axis, letter) in AXES.iter().enumerate() {
                if let Some(v) = gc.arg(*letter) {
                    if state.absolute {
                        state.position[axis] = v;
                    } else {
                        state.position[axis] += v;
                    }
                }
            }
            true
        });
    }

    {
        let state = state.clone();
        dispatcher.add_handler(HandlerKind::GCode, 28, move |_, _| {
            state.lock().unwrap_or_else(PoisonError::into_inner).position = [0.0; 3];
            true
        });
    }

    for (code, absolute) in [(90, true), (91, false)] {
        let state = state.clone();
        dispatcher.add_handler(HandlerKind::GCode, code, move |_, _| {
            state.lock().unwrap_or_else(PoisonError::into_inner).absolute = absolute;
            true
        });
    }

    {
        let state = state.clone();
        dispatcher.add_handler(HandlerKind::GCode, 92, move |gc, _| {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if gc.has_no_args() {
                state.position = [0.0; 3];
            }
            for (axis, letter) in AXES.iter().enumerate() {
                if let Some(v) = gc.arg(*letter) {
                    state.position[axis] = v;
                }
            }
            true
        });
    }

    dispatcher.add_handler(HandlerKind::MCode, 114, move |_, os| {
        let state = *state.lock().unwrap_or_else(PoisonError::into_inner);
        let [x, y, z] = state.position;
        os.set_prepend_ok(true);
        os.printf(format_args!("C: X:{x:.4} Y:{y:.4} Z:{z:.4}\n"));
        true
    });

    dispatcher.add_handler(HandlerKind::MCode, 115, |_, os| {
        os.printf(format_args!(
            "FIRMWARE_NAME:{FIRMWARE_NAME}, FIRMWARE_VERSION:{}",
            env!("CARGO_PKG_VERSION")
        ));
        os.set_append_nl(true);
        true
    });

    dispatcher.add_handler(HandlerKind::MCode, 112, move |_, os| {
        halt.broadcast_halt(true);
        os.puts("ALARM: Emergency stop\n");
        os.set_no_response(true);
        true
    });

    dispatcher.add_command_handler("version", |_, os| {
        os.printf(format_args!("{FIRMWARE_NAME} {}\n", env!("CARGO_PKG_VERSION")));
        true
    });

    // register last so the list includes everything above
    let mut names: Vec<String> = dispatcher.commands().map(str::to_string).collect();
    names.push("help".to_string());
    dispatcher.add_command_handler("help", move |_, os| {
        for name in &names {
            os.printf(format_args!("{name}\n"));
        }
        true
    });
}

fn build_console(config: &Config) -> Console {
    let halt = Arc::new(HaltFlag::new());
    halt.subscribe(|halted| {
        if halted {
            log::warn!("machine halted, send M999 or $X to clear");
        }
    });

    let mut dispatcher = Dispatcher::new(halt.clone());
    dispatcher.set_grbl_mode(config.grbl_mode);
    let card = config.sd_root.as_ref().map(SdCard::new);
    if let Some(card) = &card {
        register_card_commands(&mut dispatcher, card.clone());
    }
    register_handlers(&mut dispatcher, halt);

    let mut console = Console::new(dispatcher);
    console.set_echo(config.echo);
    if let Some(card) = card {
        console.set_sd_card(card);
    }
    console
}

fn register_card_commands(dispatcher: &mut Dispatcher, card: SdCard) {
    dispatcher.add_command_handler("rm", move |path, os| {
        let path = path.trim();
        match card.remove(path) {
            Ok(()) => log::info!("deleted {}", path),
            Err(e) => {
                log::debug!("rm {}: {}", path, e);
                os.printf(format_args!("Could not delete {path}\n"));
            }
        }
        true
    });
}

async fn run<R: AsyncBufRead + Unpin>(reader: R, console: &mut Console, os: &mut OutputStream) -> Result<()> {
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("reading input")? {
        console.process_line(&line, os);
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::from_args_and_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level)).init();
    if let Some(path) = &config.config_file {
        log::info!("loaded config from {}", path.display());
    }

    let mut console = build_console(&config);
    let mut os = OutputStream::new(std::io::stdout());

    match &config.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            run(BufReader::new(file), &mut console, &mut os).await
        }
        None => run(BufReader::new(tokio::io::stdin()), &mut console, &mut os).await,
    }
}
