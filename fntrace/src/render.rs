// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use crate::field::{format_time_unit, format_timestamp, Field};
use crate::reconstruct::{Announcement, Boundary};
use protocol::{Event, EventKind};
use std::collections::HashMap;
use std::io::{self, Write};

/// Prints announcements as an indented call graph, one line each.
pub struct GraphRenderer<W: Write> {
    writer: W,
    fields: Vec<Field>,
    /// Index into the announcement's annotation for each metadata field.
    annotation_index: Vec<Option<usize>>,
    first_timestamp: u64,
    last_timestamps: HashMap<i32, u64>,
    header: bool,
    header_written: bool,
    task_newline: bool,
    last_tid: Option<i32>,
    lines: u64,
    line: String,
}

impl<W: Write> GraphRenderer<W> {
    /// `first_timestamp` is the trace start used by the `elapsed` field.
    pub fn new(writer: W, fields: Vec<Field>, first_timestamp: u64) -> Self {
        let mut next = 0;
        let annotation_index = fields
            .iter()
            .map(|field| {
                field.meta_name().map(|_| {
                    next += 1;
                    next - 1
                })
            })
            .collect();
        Self {
            writer,
            fields,
            annotation_index,
            first_timestamp,
            last_timestamps: HashMap::new(),
            header: true,
            header_written: false,
            task_newline: false,
            last_tid: None,
            lines: 0,
            line: String::new(),
        }
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn with_task_newline(mut self, task_newline: bool) -> Self {
        self.task_newline = task_newline;
        self
    }

    /// Call graph lines written so far, not counting the header.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    fn write_header(&mut self) -> io::Result<()> {
        let mut header = String::from("#");
        let columns: Vec<String> = self.fields.iter().map(Field::header).collect();
        header.push_str(&columns.join(" "));
        header.push_str("   FUNCTION");
        writeln!(self.writer, "{}", header)
    }

    fn format_field(&self, index: usize, announcement: &Announcement) -> String {
        let field = &self.fields[index];
        let width = field.width();
        match field {
            Field::Duration => match announcement.duration() {
                Some(duration) => format_time_unit(duration),
                None => " ".repeat(width),
            },
            Field::Tid => format!("[{:6}]", announcement.tid),
            Field::Time => format_timestamp(announcement.timestamp),
            Field::Delta => {
                let last = self
                    .last_timestamps
                    .get(&announcement.tid)
                    .copied()
                    .unwrap_or(announcement.timestamp);
                format_time_unit(announcement.timestamp.saturating_sub(last))
            }
            Field::Elapsed => {
                format_time_unit(announcement.timestamp.saturating_sub(self.first_timestamp))
            }
            Field::Meta(_) => {
                let value = self.annotation_index[index]
                    .and_then(|i| announcement.annotation.get(i))
                    .and_then(|value| value.as_deref())
                    .unwrap_or("");
                format!("{:>width$}", value, width = width)
            }
        }
    }

    pub fn render(&mut self, announcement: &Announcement) -> io::Result<()> {
        if self.header && !self.header_written {
            self.write_header()?;
            self.header_written = true;
        }
        if self.task_newline
            && self
                .last_tid
                .is_some_and(|last_tid| last_tid != announcement.tid)
        {
            writeln!(self.writer)?;
        }

        let mut line = std::mem::take(&mut self.line);
        line.clear();
        if !self.fields.is_empty() {
            for index in 0..self.fields.len() {
                line.push(' ');
                line.push_str(&self.format_field(index, announcement));
            }
            line.push_str(" | ");
        }
        let indent = announcement.depth * 2;
        match announcement.boundary {
            Boundary::Enter => {
                line.push_str(&format!("{:indent$}{}() {{", "", announcement.function));
            }
            Boundary::Exit => {
                line.push_str(&format!("{:indent$}}} /* {} */", "", announcement.function));
            }
        }
        let result = writeln!(self.writer, "{}", line);
        self.line = line;
        result?;

        self.last_timestamps
            .insert(announcement.tid, announcement.timestamp);
        self.last_tid = Some(announcement.tid);
        self.lines += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Prints raw merged events without reconstructing the call tree.
pub struct FlatRenderer<W: Write> {
    writer: W,
    count: u64,
    stacks: HashMap<i32, Vec<u64>>,
}

impl<W: Write> FlatRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            count: 0,
            stacks: HashMap::new(),
        }
    }

    pub fn render(&mut self, event: &Event) -> io::Result<()> {
        let n = self.count;
        self.count += 1;
        let stack = self.stacks.entry(event.tid).or_default();
        match &event.kind {
            EventKind::Entry { function } => {
                writeln!(
                    self.writer,
                    "[{}] ==> {}/{}: ip ({}), time ({})",
                    n,
                    event.tid,
                    stack.len(),
                    function,
                    event.timestamp
                )?;
                stack.push(event.timestamp);
            }
            EventKind::Exit { function } => {
                let entered = stack.pop().unwrap_or(event.timestamp);
                writeln!(
                    self.writer,
                    "[{}] <== {}/{}: ip ({}), time ({}:{})",
                    n,
                    event.tid,
                    stack.len(),
                    function,
                    event.timestamp,
                    event.timestamp.saturating_sub(entered)
                )?;
            }
            EventKind::Meta { field, value } => {
                writeln!(
                    self.writer,
                    "[{}] !!! {}: {}={} time ({})",
                    n, event.tid, field, value, event.timestamp
                )?;
            }
        }
        Ok(())
    }

    pub fn events(&self) -> u64 {
        self.count
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
