//! Input module.
//! Turns operator clicks into surface pixels for the calibration session.
//! Clicks are either typed at an interactive prompt (screen coordinates as shown by whatever
//! viewer displays the preview) or replayed from the command line.
//! Reading happens on a blocking worker so pending camera requests never stall input.

use crate::overlay::{capture_click, Bounds, PointerEvent};
use anyhow::{Context, Result};
use dialoguer::Input;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub enum ClickSource {
    Interactive,
    Scripted(Vec<PointerEvent>),
}

/// Parses `X,Y` or `X Y` screen coordinates.
pub fn parse_click(text: &str) -> Result<PointerEvent> {
    let mut parts = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty());
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        anyhow::bail!("Expected two coordinates like '512,288', got '{}'", text);
    };
    Ok(PointerEvent {
        client_x: x.parse().with_context(|| format!("Invalid x coordinate '{}'", x))?,
        client_y: y.parse().with_context(|| format!("Invalid y coordinate '{}'", y))?,
    })
}

impl ClickSource {
    /// Starts delivering surface pixels; the channel closes when the source is exhausted
    /// or the operator quits.
    pub fn spawn(self, bounds: Bounds) -> UnboundedReceiver<(i32, i32)> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self {
            ClickSource::Scripted(events) => {
                for event in events {
                    if tx.send(capture_click(event, bounds)).is_err() {
                        break;
                    }
                }
            }
            ClickSource::Interactive => {
                tokio::task::spawn_blocking(move || prompt_loop(tx, bounds));
            }
        }
        rx
    }
}

fn prompt_loop(tx: UnboundedSender<(i32, i32)>, bounds: Bounds) {
    loop {
        let line = match Input::<String>::new()
            .with_prompt("Click (x,y), empty or q to finish")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Input closed: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() || line.eq_ignore_ascii_case("q") {
            break;
        }
        match parse_click(line) {
            Ok(event) => {
                if tx.send(capture_click(event, bounds)).is_err() {
                    break;
                }
            }
            Err(e) => eprintln!("{:#}", e),
        }
    }
}
