use std::{path::PathBuf, sync::Arc};

use tempo_controls::{
    Controls, QueueReceiver, StateReceiver,
    library::{Library, MemoryLibrary},
    queue_view::QueueView,
};
use tempo_models::Uid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::cli::load_library;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Play {
        parent: Option<Uid>,
        start: usize,
    },
    PlayNext(Uid),
    Add(Uid),
    Toggle,
    Next,
    Previous,
    Seek(u64),
    Shuffle,
    Repeat,
    Goto(usize),
    Remove(usize),
    Move(usize, usize),
    Queue,
    Status,
    Rescan,
    Help,
    Quit,
}

const HELP: &str = "\
play [parent] [index]  start playback of a parent, or the whole library
next-up <uid>          queue an item after the current one
add <uid>              queue an item at the end
toggle | next | prev   transport
seek <seconds>         jump within the current item
shuffle | repeat       toggle shuffle, cycle repeat mode
goto <n> | remove <n> | move <from> <to>
queue | status | rescan | quit";

fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Err("empty command".into());
    };
    let args: Vec<&str> = words.collect();

    let index = |position: usize| -> Result<usize, String> {
        let value = args
            .get(position)
            .ok_or_else(|| format!("{command} needs an index"))?;
        value
            .parse()
            .map_err(|_| format!("{value} is not a valid index"))
    };
    let uid = |position: usize| -> Result<Uid, String> {
        args.get(position)
            .map(|value| Uid::from(*value))
            .ok_or_else(|| format!("{command} needs an item id"))
    };

    let parsed = match command {
        "play" => {
            let parent = args
                .first()
                .filter(|value| **value != "all")
                .map(|value| Uid::from(*value));
            let start = if args.len() > 1 { index(1)? } else { 0 };
            Command::Play { parent, start }
        }
        "next-up" => Command::PlayNext(uid(0)?),
        "add" => Command::Add(uid(0)?),
        "toggle" => Command::Toggle,
        "next" => Command::Next,
        "prev" => Command::Previous,
        "seek" => Command::Seek(index(0)? as u64 * 1_000),
        "shuffle" => Command::Shuffle,
        "repeat" => Command::Repeat,
        "goto" => Command::Goto(index(0)?),
        "remove" => Command::Remove(index(0)?),
        "move" => Command::Move(index(0)?, index(1)?),
        "queue" => Command::Queue,
        "status" => Command::Status,
        "rescan" => Command::Rescan,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command {other}, try help")),
    };

    Ok(parsed)
}

/// Reads commands from stdin. Closing stdin leaves the player running,
/// `quit` stops it. Index commands and listings go through the queue view.
pub async fn run(
    controls: Controls,
    view: Arc<QueueView>,
    mut library: Arc<MemoryLibrary>,
    library_path: Option<PathBuf>,
    queue_receiver: QueueReceiver,
    state_receiver: StateReceiver,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "unable to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            Command::Play { parent, start } => {
                let (parent, items) = match parent {
                    Some(uid) => match library.parent_items(&uid) {
                        Some((parent, items)) => (Some(parent), items),
                        None => {
                            println!("no parent {uid}");
                            continue;
                        }
                    },
                    None => (None, library.items().to_vec()),
                };

                if let Err(error) = controls.play_items(items, parent, start, None).await {
                    println!("{error}");
                }
            }
            Command::PlayNext(uid) => match library.find_item(&uid) {
                Some(item) => controls.play_next(vec![item]),
                None => println!("no item {uid}"),
            },
            Command::Add(uid) => match library.find_item(&uid) {
                Some(item) => controls.add_to_queue(vec![item]),
                None => println!("no item {uid}"),
            },
            Command::Toggle => controls.play_pause(),
            Command::Next => controls.next(),
            Command::Previous => controls.previous(),
            Command::Seek(position_ms) => controls.seek(position_ms),
            Command::Shuffle => controls.toggle_shuffle(),
            Command::Repeat => controls.cycle_repeat_mode(),
            Command::Goto(index) => report(view.goto(index).await),
            Command::Remove(index) => report(view.remove(index).await),
            Command::Move(from, to) => report(view.move_item(from, to).await),
            Command::Queue => {
                let edits = view.take_instructions().len();
                let current = view.index();
                let items = view.items();
                for (index, item) in items.iter().enumerate() {
                    let marker = if Some(index) == current { ">" } else { " " };
                    println!("{marker} {index:>3} {} ({})", item.title, item.uid);
                }
                if items.is_empty() {
                    println!("queue is empty");
                } else if edits > 0 {
                    println!("{edits} edits since last listing");
                }
            }
            Command::Status => {
                let state = *state_receiver.borrow();
                let queue = queue_receiver.borrow().clone();
                let title = queue
                    .current()
                    .map(|item| item.title.clone())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:?} {} at {}s, repeat {:?}, shuffle {}",
                    state.status,
                    title,
                    state.position_ms / 1_000,
                    state.repeat_mode,
                    queue.shuffled
                );
            }
            Command::Rescan => match load_library(library_path.as_ref()).await {
                Ok(reloaded) => {
                    library = Arc::new(reloaded);
                    controls.library_changed(library.clone());
                    println!("library has {} items", library.items().len());
                }
                Err(error) => println!("{error}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => {
                controls.quit();
                return;
            }
        }
    }
}

fn report(accepted: bool) {
    if !accepted {
        println!("queue changed, index no longer valid");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse("play album-1 3"),
            Ok(Command::Play {
                parent: Some("album-1".into()),
                start: 3
            })
        );
        assert_eq!(
            parse("play"),
            Ok(Command::Play {
                parent: None,
                start: 0
            })
        );
        assert_eq!(
            parse("play all 2"),
            Ok(Command::Play {
                parent: None,
                start: 2
            })
        );
        assert_eq!(parse("move 1 4"), Ok(Command::Move(1, 4)));
        assert_eq!(parse("seek 12"), Ok(Command::Seek(12_000)));
        assert_eq!(parse("  quit  "), Ok(Command::Quit));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("goto").is_err());
        assert!(parse("remove x").is_err());
        assert!(parse("move 1").is_err());
        assert!(parse("dance").is_err());
        assert!(parse("add").is_err());
    }
}
