use std::io::{Write, stdout};
use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{
    Event, KeyCode, KeyEventKind, KeyboardEnhancementFlags, PushKeyboardEnhancementFlags, poll,
    read,
};
use crossterm::terminal::{
    Clear, ClearType, disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement,
};
use crossterm::{cursor, execute};
use tracing_subscriber::EnvFilter;

use voxkey::{EngineCommand, EngineUpdate, Note, spawn_engine};

const DEFAULT_SAMPLE_PATH: &str = "assets/im-listening.mp3";

/// Home-row piano layout: white keys on asdfghj, sharps on the row above.
fn key_to_note(c: char) -> Option<Note> {
    match c {
        'a' => Some(Note::C),
        'w' => Some(Note::Cs),
        's' => Some(Note::D),
        'e' => Some(Note::Ds),
        'd' => Some(Note::E),
        'f' => Some(Note::F),
        't' => Some(Note::Fs),
        'g' => Some(Note::G),
        'y' => Some(Note::Gs),
        'h' => Some(Note::A),
        'u' => Some(Note::As),
        'j' => Some(Note::B),
        _ => None,
    }
}

fn draw_keys(held: &[Note], status: &str) -> std::io::Result<()> {
    let mut out = stdout();
    execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    let mut line = String::new();
    for note in Note::ALL {
        if held.contains(&note) {
            line.push_str(&format!("[{}] ", note));
        } else {
            line.push_str(&format!(" {}  ", note));
        }
    }
    write!(out, "{line}  {status}")?;
    out.flush()
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let sample_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SAMPLE_PATH));

    let engine = spawn_engine(sample_path);

    enable_raw_mode()?;
    // Release events only arrive on terminals that speak the kitty
    // keyboard protocol; elsewhere each press gets an immediate
    // synthetic release so the held display stays truthful.
    let release_events = supports_keyboard_enhancement().unwrap_or(false);
    if release_events {
        execute!(
            stdout(),
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }

    let mut held: Vec<Note> = Vec::new();
    let mut status = String::from("press keys to play, Esc to quit");
    draw_keys(&held, &status)?;

    'outer: loop {
        if poll(Duration::from_millis(33))? {
            if let Event::Key(key) = read()? {
                match (key.code, key.kind) {
                    (KeyCode::Esc, KeyEventKind::Press) => break 'outer,
                    (KeyCode::Char(c), KeyEventKind::Press) => {
                        if let Some(note) = key_to_note(c) {
                            let _ = engine.command_tx.send(EngineCommand::NoteOn(note));
                            if !release_events {
                                let _ = engine.command_tx.send(EngineCommand::NoteOff(note));
                            }
                        }
                    }
                    (KeyCode::Char(c), KeyEventKind::Release) => {
                        if let Some(note) = key_to_note(c) {
                            let _ = engine.command_tx.send(EngineCommand::NoteOff(note));
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut dirty = false;
        while let Ok(update) = engine.update_rx.try_recv() {
            match update {
                EngineUpdate::HeldKeys(keys) => {
                    held = keys;
                    dirty = true;
                }
                EngineUpdate::SampleReady => {
                    status = String::from("sample ready");
                    dirty = true;
                }
                EngineUpdate::Error { message } => {
                    status = message;
                    dirty = true;
                }
            }
        }
        if dirty {
            draw_keys(&held, &status)?;
        }
    }

    if release_events {
        execute!(stdout(), crossterm::event::PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    println!();
    Ok(())
}
