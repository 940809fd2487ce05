#[cfg(not(unix))]
use std::sync::mpsc;

use serde_json::{Value, json};

use super::{MediaBackend, MediaEvent, MediaHandle, PlaybackError, SessionToken, TaggedEvent};

const PLAY_REQUEST_ID: u64 = 100;

/// Plays media through an `mpv` child process driven over its JSON IPC socket.
pub(crate) struct MpvBackend {
    player_bin: String,
}

impl MpvBackend {
    pub(crate) fn new(player_bin: &str) -> Self {
        Self {
            player_bin: player_bin.to_string(),
        }
    }
}

fn observe_commands() -> Vec<String> {
    ["duration", "time-pos", "eof-reached"]
        .iter()
        .enumerate()
        .map(|(idx, name)| json!({ "command": ["observe_property", idx + 1, name] }).to_string())
        .collect()
}

fn pause_command(paused: bool) -> String {
    let mut command = json!({ "command": ["set_property", "pause", paused] });
    if !paused {
        command["request_id"] = json!(PLAY_REQUEST_ID);
    }
    command.to_string()
}

fn seek_command(seconds: f64) -> String {
    json!({ "command": ["seek", seconds, "absolute"] }).to_string()
}

/// Maps one line of mpv IPC output to a media event, if it carries one.
pub(crate) fn parse_ipc_line(line: &str) -> Option<MediaEvent> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;

    if let Some(event) = value.get("event").and_then(Value::as_str) {
        return match event {
            "property-change" => parse_property_change(&value),
            "end-file" if value.get("reason").and_then(Value::as_str) == Some("error") => {
                let reason = value
                    .get("file_error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                Some(MediaEvent::LoadFailed {
                    reason: reason.to_string(),
                })
            }
            _ => None,
        };
    }

    let request_id = value.get("request_id").and_then(Value::as_u64)?;
    let error = value.get("error").and_then(Value::as_str)?;
    (request_id == PLAY_REQUEST_ID && error != "success").then(|| MediaEvent::PlayRejected {
        reason: error.to_string(),
    })
}

fn parse_property_change(value: &Value) -> Option<MediaEvent> {
    let data = value.get("data")?;
    match value.get("name").and_then(Value::as_str)? {
        "duration" => Some(MediaEvent::MetadataLoaded {
            duration: data.as_f64()?,
        }),
        "time-pos" => Some(MediaEvent::PositionUpdated {
            seconds: data.as_f64()?,
        }),
        "eof-reached" => data.as_bool()?.then_some(MediaEvent::TrackEnded),
        _ => None,
    }
}

#[cfg(unix)]
mod unix {
    use std::env;
    use std::fs;
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixStream;
    use std::path::{Path, PathBuf};
    use std::process::{Child, Command as ProcessCommand, Stdio};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, mpsc};
    use std::thread;
    use std::time::Duration;

    use log::{debug, warn};

    use super::*;

    const CONNECT_ATTEMPTS: usize = 50;
    const CONNECT_DELAY: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct IpcWriter {
        stream: Option<UnixStream>,
        pending: Vec<String>,
    }

    impl IpcWriter {
        fn send(&mut self, line: String) {
            match self.stream.as_mut() {
                Some(stream) => {
                    if let Err(err) = writeln!(stream, "{line}") {
                        debug!("mpv ipc write failed: {err}");
                    }
                }
                None => self.pending.push(line),
            }
        }

        fn attach(&mut self, stream: UnixStream) {
            self.stream = Some(stream);
            for line in observe_commands() {
                self.send(line);
            }
            for line in std::mem::take(&mut self.pending) {
                self.send(line);
            }
        }
    }

    pub(crate) struct MpvHandle {
        child: Child,
        writer: Arc<Mutex<IpcWriter>>,
        released: Arc<AtomicBool>,
        socket_path: PathBuf,
    }

    impl MpvHandle {
        fn send(&self, line: String) {
            match self.writer.lock() {
                Ok(mut writer) => writer.send(line),
                Err(_) => warn!("mpv ipc writer poisoned, dropping command"),
            }
        }
    }

    impl MediaHandle for MpvHandle {
        fn play(&mut self) {
            self.send(pause_command(false));
        }

        fn pause(&mut self) {
            self.send(pause_command(true));
        }

        fn seek(&mut self, seconds: f64) {
            self.send(seek_command(seconds));
        }

        fn release(&mut self) {
            if self.released.swap(true, Ordering::SeqCst) {
                return;
            }
            self.send(json!({ "command": ["quit"] }).to_string());
            let _ = self.child.kill();
            let _ = self.child.wait();
            let _ = fs::remove_file(&self.socket_path);
        }
    }

    impl Drop for MpvHandle {
        fn drop(&mut self) {
            self.release();
        }
    }

    fn socket_path_for(token: SessionToken) -> PathBuf {
        env::temp_dir().join(format!(
            "lingocast-mpv-{}-{}.sock",
            std::process::id(),
            token.raw()
        ))
    }

    fn connect_with_retry(path: &Path, released: &AtomicBool) -> Option<UnixStream> {
        for _ in 0..CONNECT_ATTEMPTS {
            if released.load(Ordering::SeqCst) {
                return None;
            }
            if let Ok(stream) = UnixStream::connect(path) {
                return Some(stream);
            }
            thread::sleep(CONNECT_DELAY);
        }
        None
    }

    fn spawn_reader(
        token: SessionToken,
        socket_path: PathBuf,
        writer: Arc<Mutex<IpcWriter>>,
        released: Arc<AtomicBool>,
        events: mpsc::Sender<TaggedEvent>,
    ) {
        thread::spawn(move || {
            let emit = |event: MediaEvent| events.send(TaggedEvent { token, event }).is_ok();

            let Some(stream) = connect_with_retry(&socket_path, &released) else {
                if !released.load(Ordering::SeqCst) {
                    emit(MediaEvent::LoadFailed {
                        reason: "player did not open its control socket".to_string(),
                    });
                }
                return;
            };
            let reader = match stream.try_clone() {
                Ok(reader) => reader,
                Err(err) => {
                    emit(MediaEvent::LoadFailed {
                        reason: format!("control socket unusable: {err}"),
                    });
                    return;
                }
            };
            match writer.lock() {
                Ok(mut writer) => writer.attach(stream),
                Err(_) => return,
            }

            for line in BufReader::new(reader).lines() {
                let Ok(line) = line else {
                    break;
                };
                if let Some(event) = parse_ipc_line(&line)
                    && !emit(event)
                {
                    return;
                }
            }

            if !released.load(Ordering::SeqCst) {
                emit(MediaEvent::LoadFailed {
                    reason: "player exited unexpectedly".to_string(),
                });
            }
        });
    }

    impl MediaBackend for MpvBackend {
        type Handle = MpvHandle;

        fn open(
            &mut self,
            token: SessionToken,
            source: &str,
            events: mpsc::Sender<TaggedEvent>,
        ) -> Result<MpvHandle, PlaybackError> {
            let socket_path = socket_path_for(token);
            let _ = fs::remove_file(&socket_path);

            let child = ProcessCommand::new(&self.player_bin)
                .arg("--no-video")
                .arg("--no-terminal")
                .arg("--idle=yes")
                .arg("--keep-open=yes")
                .arg("--pause")
                .arg(format!("--input-ipc-server={}", socket_path.display()))
                .arg("--")
                .arg(source)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|err| {
                    PlaybackError::LoadFailed(format!("failed to launch {}: {err}", self.player_bin))
                })?;

            let writer = Arc::new(Mutex::new(IpcWriter::default()));
            let released = Arc::new(AtomicBool::new(false));
            spawn_reader(
                token,
                socket_path.clone(),
                Arc::clone(&writer),
                Arc::clone(&released),
                events,
            );

            Ok(MpvHandle {
                child,
                writer,
                released,
                socket_path,
            })
        }
    }
}

#[cfg(not(unix))]
pub(crate) struct MpvHandle;

#[cfg(not(unix))]
impl MediaHandle for MpvHandle {
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn seek(&mut self, _seconds: f64) {}
    fn release(&mut self) {}
}

#[cfg(not(unix))]
impl MediaBackend for MpvBackend {
    type Handle = MpvHandle;

    fn open(
        &mut self,
        _token: SessionToken,
        _source: &str,
        _events: mpsc::Sender<TaggedEvent>,
    ) -> Result<MpvHandle, PlaybackError> {
        Err(PlaybackError::LoadFailed(format!(
            "{} control requires unix domain sockets",
            self.player_bin
        )))
    }
}
