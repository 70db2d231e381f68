//! Job reader/dispatcher: the blocking request loop.
//!
//! Reads one line at a time, runs each job to completion and flushes its
//! response before the next line is read. Stdout carries only protocol
//! lines; diagnostics go through `tracing`.

use crate::encoder::{write_line, EncodeError, ResponseEncoder};
use crate::job::{parse_line, Command, Job};
use facefind_core::{CropWriter, FaceFinder, FindOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Log target for the per-line diagnostics.
pub const LOG_TARGET: &str = "facefind";

/// Reply to the quit sentinel. Not JSON.
pub const QUIT_MESSAGE: &str = "Quitting";

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("reading input: {0}")]
    Input(#[source] std::io::Error),
    #[error("writing output: {0}")]
    Output(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Terminated(Termination),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Sentinel,
    EndOfStream,
}

/// What happened to one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Response emitted with this many faces.
    Completed { faces: usize },
    /// The job failed; an empty array was emitted in its place.
    Failed,
    /// The line was malformed; nothing was emitted.
    Skipped,
}

pub struct Dispatcher<F, W> {
    finder: F,
    encoder: ResponseEncoder<W>,
    gallery: PathBuf,
    options: FindOptions,
    state: State,
}

impl<F: FaceFinder, W: CropWriter> Dispatcher<F, W> {
    pub fn new(finder: F, encoder: ResponseEncoder<W>, gallery: PathBuf, options: FindOptions) -> Self {
        Self {
            finder,
            encoder,
            gallery,
            options,
            state: State::Running,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Process lines from `input` until the sentinel or end of stream.
    ///
    /// Only I/O failures on the streams themselves end the loop with an error.
    pub fn run<R: BufRead, O: Write>(
        &mut self,
        mut input: R,
        out: &mut O,
    ) -> Result<Termination, DispatchError> {
        let mut buf = Vec::new();

        loop {
            if let State::Terminated(reason) = self.state {
                return Ok(reason);
            }

            buf.clear();
            let read = input.read_until(b'\n', &mut buf).map_err(DispatchError::Input)?;
            if read == 0 {
                self.state = State::Terminated(Termination::EndOfStream);
                tracing::debug!("input closed");
                continue;
            }

            let line = String::from_utf8_lossy(&buf);
            self.handle_line(&line, out)?;
        }
    }

    /// Handle one raw input line. Returns `None` once the sentinel is seen.
    pub fn handle_line<O: Write>(
        &mut self,
        line: &str,
        out: &mut O,
    ) -> Result<Option<JobOutcome>, DispatchError> {
        let line = line.trim();
        tracing::info!(target: LOG_TARGET, "{line}");

        match parse_line(line) {
            Ok(Command::Quit) => {
                write_line(out, QUIT_MESSAGE).map_err(DispatchError::Output)?;
                self.state = State::Terminated(Termination::Sentinel);
                Ok(None)
            }
            Ok(Command::Run(job)) => {
                let outcome = self.process(&job, out)?;
                tracing::info!(target: LOG_TARGET, "done with {}", job.image_path);
                Ok(Some(outcome))
            }
            Err(e) => {
                tracing::warn!(line, error = %e, "skipping malformed line");
                Ok(Some(JobOutcome::Skipped))
            }
        }
    }

    /// Run one job and emit exactly one response line for it.
    pub fn process<O: Write>(&mut self, job: &Job, out: &mut O) -> Result<JobOutcome, DispatchError> {
        if !Path::new(&job.cache_directory).is_dir() {
            tracing::error!(
                cache_directory = %job.cache_directory,
                "cache directory does not exist; responding with no faces"
            );
            return self.emit_empty(job, out);
        }

        let detections = match self
            .finder
            .find(Path::new(&job.image_path), &self.gallery, &self.options)
        {
            Ok(detections) => detections,
            Err(e) => {
                tracing::error!(
                    image = %job.image_path,
                    error = %e,
                    "recognition failed; responding with no faces"
                );
                return self.emit_empty(job, out);
            }
        };

        match self.encoder.emit(out, &detections, &job.cache_directory) {
            Ok(faces) => {
                tracing::debug!(image = %job.image_path, detected = detections.len(), reported = faces, "response emitted");
                Ok(JobOutcome::Completed { faces })
            }
            Err(EncodeError::Output(e)) => Err(DispatchError::Output(e)),
            Err(e) => {
                tracing::error!(image = %job.image_path, error = %e, "cannot encode response");
                self.emit_empty(job, out)
            }
        }
    }

    fn emit_empty<O: Write>(&self, job: &Job, out: &mut O) -> Result<JobOutcome, DispatchError> {
        tracing::debug!(image = %job.image_path, "emitting empty response");
        write_line(out, "[]").map_err(DispatchError::Output)?;
        Ok(JobOutcome::Failed)
    }
}
