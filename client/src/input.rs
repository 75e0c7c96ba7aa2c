//! Local input events and the server's subscriptions to them
//!
//! The server asks for events by name (`EventListen`); the client remembers
//! which tags belong to which event and reports each occurrence once per tag.
//! Events come from stdin, one per line: the event name, optionally followed
//! by arguments, e.g. `w`, `w-up` or `teleport 1.5 -3 true`.

use log::debug;
use shared::messages::{EventListen, EventOccurred};
use shared::EventArg;
use std::collections::HashMap;
use std::io::BufRead;
use tokio::sync::mpsc;

/// A locally observed event
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEvent {
    pub name: String,
    pub args: Vec<EventArg>,
}

impl LocalEvent {
    /// Parses one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let name = words.next()?.to_string();
        let args = words.map(parse_arg).collect();
        Some(Self { name, args })
    }
}

fn parse_arg(word: &str) -> EventArg {
    if let Ok(value) = word.parse::<bool>() {
        EventArg::Bool(value)
    } else if let Ok(value) = word.parse::<i64>() {
        EventArg::Int(value)
    } else if let Ok(value) = word.parse::<f64>() {
        EventArg::Float(value)
    } else {
        EventArg::Text(word.to_string())
    }
}

/// Tags the server subscribed, grouped by event name
#[derive(Debug, Default)]
pub struct Subscriptions {
    by_event: HashMap<String, Vec<u32>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&mut self, request: EventListen) {
        debug!("Server listens for {} as tag {}", request.event, request.tag);
        self.by_event
            .entry(request.event)
            .or_default()
            .push(request.tag);
    }

    /// One report per tag subscribed to the event, in subscription order
    pub fn occurred(&self, event: &LocalEvent) -> Vec<EventOccurred> {
        self.by_event
            .get(&event.name)
            .map(|tags| {
                tags.iter()
                    .map(|&tag| EventOccurred {
                        tag,
                        args: event.args.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of subscribed tags
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}

/// Spawns a thread that forwards parsed stdin lines until EOF
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<LocalEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if let Some(event) = LocalEvent::parse(&line) {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });

    rx
}
