//! Output rendering
//!
//! Text mode prints one colored line per record; JSON mode prints one
//! object per line for piping into other tools.

use std::collections::HashSet;

use colored::{ColoredString, Colorize};

use crate::interpreter::{Group, Line};

pub struct RecordFormatter {
    json: bool,
    show_timestamps: bool,
    groups: Option<HashSet<Group>>,
}

impl RecordFormatter {
    pub fn new(json: bool, show_timestamps: bool) -> Self {
        Self {
            json,
            show_timestamps,
            groups: None,
        }
    }

    /// Restricts output to `groups`. Unknown names are returned.
    pub fn set_filters<'a>(&mut self, names: &'a [String]) -> Vec<&'a str> {
        let mut groups = HashSet::new();
        let mut unknown = Vec::new();
        for name in names {
            match Group::parse(name) {
                Some(g) => {
                    groups.insert(g);
                }
                None => unknown.push(name.as_str()),
            }
        }
        self.groups = Some(groups);
        unknown
    }

    /// Renders `line`, or `None` when it is filtered out.
    pub fn format(&self, line: &Line) -> Option<String> {
        if let Some(groups) = &self.groups {
            if !groups.contains(&line.group) {
                return None;
            }
        }
        if self.json {
            // a Line always serializes
            serde_json::to_string(line).ok()
        } else {
            Some(self.format_text(line))
        }
    }

    fn format_text(&self, line: &Line) -> String {
        let stamp = match (self.show_timestamps, line.timestamp) {
            (true, Some(ts)) => format!("{ts:010} ").dimmed().to_string(),
            (true, None) => " ".repeat(11),
            (false, _) => String::new(),
        };
        format!("{stamp}{:<24} {}", colorize(line.group, &line.record), line.text)
    }
}

fn colorize(group: Group, name: &str) -> ColoredString {
    match group {
        Group::Sm => name.bright_blue(),
        Group::Ao => name.bright_green(),
        Group::Pool => name.bright_magenta(),
        Group::Qf => name.green(),
        Group::Te => name.bright_yellow(),
        Group::Isr => name.red(),
        Group::Sched => name.bright_white(),
        Group::Sem => name.cyan(),
        Group::Mtx => name.magenta(),
        Group::Info => name.yellow(),
        Group::User => name.white(),
    }
}
