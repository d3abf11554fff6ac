// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped redirection of the process standard streams.
//!
//! [`StreamCapture::grab`] swaps the stdout/stderr file descriptors for
//! pipes, buffering everything written while the capture is active; with
//! `tee` the bytes are also forwarded to the original streams in real time.
//! Exactly one capture may be active per process. Restoration happens on
//! every exit path: either explicitly through [`StreamCapture::restore`],
//! which returns the captured bytes, or through `Drop` when unwinding.
//!
//! The pipes are drained by short-lived collector threads internal to the
//! capture; the test event pipeline itself remains single-threaded.

use crate::errors::CaptureError;
use std::{
    fs::File,
    io::{self, Read, Write},
    os::fd::{FromRawFd, RawFd},
    sync::atomic::{AtomicBool, Ordering},
    thread::{self, JoinHandle},
};

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes unit tests that grab the process-wide descriptors.
#[cfg(test)]
pub(crate) static CAPTURE_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// The bytes written to each stream while a capture was active.
#[derive(Clone, Debug, Default)]
pub struct CapturedOutput {
    /// Bytes written to standard output.
    pub stdout: Vec<u8>,
    /// Bytes written to standard error.
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    /// Standard output as lossily decoded UTF-8.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error as lossily decoded UTF-8.
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// An active capture of both standard streams.
#[derive(Debug)]
pub struct StreamCapture {
    streams: Option<(RedirectedStream, RedirectedStream)>,
}

impl StreamCapture {
    /// Starts capturing stdout and stderr.
    ///
    /// `label` names the collector threads, which helps when debugging a
    /// wedged run. Fails with [`CaptureError::AlreadyActive`] if another
    /// capture has not been restored yet — that is a programming bug, not a
    /// recoverable condition.
    pub fn grab(tee: bool, label: &str) -> Result<Self, CaptureError> {
        if ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyActive);
        }

        let grabbed = (|| {
            let stdout =
                RedirectedStream::redirect(libc::STDOUT_FILENO, tee, format!("cap-out-{label}"))?;
            let stderr =
                RedirectedStream::redirect(libc::STDERR_FILENO, tee, format!("cap-err-{label}"))?;
            Ok::<_, io::Error>(Self {
                streams: Some((stdout, stderr)),
            })
        })();

        match grabbed {
            Ok(capture) => Ok(capture),
            Err(error) => {
                // Any stream that was already redirected restored itself on
                // drop inside the closure.
                ACTIVE.store(false, Ordering::SeqCst);
                Err(CaptureError::Io(error))
            }
        }
    }

    /// Restores the original streams and returns everything captured.
    pub fn restore(mut self) -> CapturedOutput {
        let (mut stdout, mut stderr) = self.streams.take().expect("capture is active");
        let output = CapturedOutput {
            stdout: stdout.finish(),
            stderr: stderr.finish(),
        };
        ACTIVE.store(false, Ordering::SeqCst);
        output
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        if let Some((mut stdout, mut stderr)) = self.streams.take() {
            stdout.finish();
            stderr.finish();
            ACTIVE.store(false, Ordering::SeqCst);
        }
    }
}

/// A duplicate of the stdout descriptor, unaffected by later captures.
///
/// The reporter writes progress through this handle so that its own output
/// reaches the terminal while a test's output is being captured.
pub fn original_stdout() -> io::Result<File> {
    let fd = unsafe { libc::dup(libc::STDOUT_FILENO) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { File::from_raw_fd(fd) })
}

#[derive(Debug)]
struct RedirectedStream {
    target_fd: RawFd,
    saved_fd: Option<RawFd>,
    collector: Option<JoinHandle<Vec<u8>>>,
}

impl RedirectedStream {
    fn redirect(target_fd: RawFd, tee: bool, thread_name: String) -> io::Result<Self> {
        flush_fd(target_fd);

        let mut pipe_fds = [0 as RawFd; 2];
        check_os(unsafe { libc::pipe(pipe_fds.as_mut_ptr()) })?;
        let [read_fd, write_fd] = pipe_fds;

        let saved_fd = unsafe { libc::dup(target_fd) };
        if saved_fd < 0 {
            let error = io::Error::last_os_error();
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
            }
            return Err(error);
        }

        // The pipe's write end takes over the target descriptor; the
        // descriptor itself is now the only write-end reference, so
        // restoring the saved descriptor later delivers EOF to the
        // collector.
        if let Err(error) = check_os(unsafe { libc::dup2(write_fd, target_fd) }) {
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
                libc::close(saved_fd);
            }
            return Err(error);
        }
        unsafe { libc::close(write_fd) };

        // The descriptor is redirected from here on: every error path must
        // put it back.
        let restore = |error: io::Error| {
            unsafe {
                libc::dup2(saved_fd, target_fd);
                libc::close(saved_fd);
            }
            error
        };

        let tee_target = if tee {
            match check_os(unsafe { libc::dup(saved_fd) }) {
                Ok(tee_fd) => Some(unsafe { File::from_raw_fd(tee_fd) }),
                Err(error) => {
                    unsafe { libc::close(read_fd) };
                    return Err(restore(error));
                }
            }
        } else {
            None
        };

        let mut source = unsafe { File::from_raw_fd(read_fd) };
        let spawned = thread::Builder::new().name(thread_name).spawn(move || {
            let mut tee_target = tee_target;
            let mut captured = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match source.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        captured.extend_from_slice(&chunk[..n]);
                        if let Some(tee) = tee_target.as_mut() {
                            let _ = tee.write_all(&chunk[..n]);
                        }
                    }
                    Err(ref error) if error.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            captured
        });
        let collector = match spawned {
            Ok(collector) => collector,
            Err(error) => return Err(restore(error)),
        };

        Ok(Self {
            target_fd,
            saved_fd: Some(saved_fd),
            collector: Some(collector),
        })
    }

    /// Restores the target descriptor and drains the collector. Idempotent.
    fn finish(&mut self) -> Vec<u8> {
        let Some(saved_fd) = self.saved_fd.take() else {
            return Vec::new();
        };
        flush_fd(self.target_fd);
        unsafe {
            libc::dup2(saved_fd, self.target_fd);
            libc::close(saved_fd);
        }
        self.collector
            .take()
            .and_then(|collector| collector.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for RedirectedStream {
    fn drop(&mut self) {
        self.finish();
    }
}

fn flush_fd(fd: RawFd) {
    if fd == libc::STDOUT_FILENO {
        let _ = io::stdout().flush();
    } else {
        let _ = io::stderr().flush();
    }
}

fn check_os(result: libc::c_int) -> io::Result<libc::c_int> {
    if result < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(result)
    }
}
