//! Line-oriented host used when the bridge runs as a child process.
//!
//! Input, one task per line: `<task-id> <envelope-json>`.
//! Output, one completion per line: `{"id":..,"status":..,"payload":".."}`.
//! End of input is the shutdown sentinel.

use std::borrow::Cow;
use std::io::BufRead;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;
use tracing::trace;

use super::HostTask;
use super::Status;
use super::TaskQueue;
use crate::HostError;
use crate::Result;

#[derive(Serialize)]
struct LineCompletion<'a> {
    id: u64,
    status: i32,
    payload: Cow<'a, str>,
}

struct LineTask<W> {
    id: u64,
    payload: Vec<u8>,
    writer: Arc<Mutex<W>>,
}

impl<W: Write + Send + 'static> HostTask for LineTask<W> {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn respond(
        self: Box<Self>,
        status: Status,
        payload: &[u8],
    ) {
        let completion = LineCompletion {
            id: self.id,
            status: status.code(),
            payload: String::from_utf8_lossy(payload),
        };

        let mut line = match serde_json::to_vec(&completion) {
            Ok(line) => line,
            Err(e) => {
                error!(task_id = self.id, "failed to encode completion: {:?}", e);
                return;
            }
        };
        line.push(b'\n');

        let mut writer = self.writer.lock();
        if let Err(e) = writer.write_all(&line).and_then(|_| writer.flush()) {
            error!(task_id = self.id, "failed to write completion: {:?}", e);
        }
    }
}

pub struct LineQueue<R, W> {
    reader: R,
    writer: Arc<Mutex<W>>,
    buf: String,
}

impl<R, W> LineQueue<R, W>
where
    R: BufRead + Send,
    W: Write + Send + 'static,
{
    pub fn new(
        reader: R,
        writer: W,
    ) -> Self {
        Self {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            buf: String::new(),
        }
    }
}

impl<R, W> TaskQueue for LineQueue<R, W>
where
    R: BufRead + Send,
    W: Write + Send + 'static,
{
    fn dequeue(&mut self) -> Result<Option<Box<dyn HostTask>>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf).map_err(HostError::Io)? == 0 {
                return Ok(None);
            }

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            let (id, payload) = parse_line(line)?;
            trace!(task_id = id, "dequeued task");
            return Ok(Some(Box::new(LineTask {
                id,
                payload: payload.as_bytes().to_vec(),
                writer: self.writer.clone(),
            })));
        }
    }
}

fn parse_line(line: &str) -> Result<(u64, &str)> {
    let (id, payload) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| HostError::MalformedLine(line.to_string()))?;
    let id = id
        .parse::<u64>()
        .map_err(|_| HostError::MalformedLine(line.to_string()))?;
    Ok((id, payload.trim_start()))
}
