//! Audio decode process.
//!
//! The decoder turns a live stream URL into 16 kHz mono signed 16-bit PCM on
//! its stdout. Its stderr is forwarded to the log and its exit is reported
//! through a future; the process is killed when that future is dropped.

use crate::defaults;
use crate::error::{CohostError, Result};
use log::debug;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, DuplexStream};
use tokio::process::Command;
use tokio::sync::oneshot;

/// How the decode process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderExit {
    /// Exit code, or `None` when killed by a signal.
    Status(Option<i32>),
    /// Waiting on the process failed.
    WaitFailed(String),
}

impl fmt::Display for DecoderExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderExit::Status(Some(code)) => write!(f, "decoder exited with code {}", code),
            DecoderExit::Status(None) => write!(f, "decoder terminated by signal"),
            DecoderExit::WaitFailed(msg) => write!(f, "failed to wait for decoder: {}", msg),
        }
    }
}

/// Future resolving when the decoder exits.
pub type ExitFuture = Pin<Box<dyn Future<Output = DecoderExit> + Send>>;

/// A running decoder: its PCM output and its exit notification.
pub struct DecodedAudio {
    pub stream: Box<dyn AsyncRead + Send + Unpin>,
    pub exit: ExitFuture,
}

/// Starts decode processes.
pub trait AudioDecoder: Send + Sync {
    /// Starts decoding `url`. Must be called from within a tokio runtime.
    fn spawn(&self, url: &str) -> Result<DecodedAudio>;
}

/// Command line for one decode process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderCommand {
    pub program: String,
    pub url: String,
}

impl DecoderCommand {
    pub fn new(program: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            url: url.into(),
        }
    }

    /// Arguments passed to the decoder. Input options precede `-i`.
    /// Reconnection is disabled; a broken input ends the process and with it
    /// the run. Output is headerless PCM.
    pub fn args(&self) -> Vec<String> {
        let sample_rate = defaults::SAMPLE_RATE.to_string();
        [
            "-loglevel",
            "warning",
            "-reconnect",
            "0",
            "-reconnect_at_eof",
            "0",
            "-reconnect_streamed",
            "0",
            "-reconnect_delay_max",
            "0",
            "-i",
            self.url.as_str(),
            "-vn",
            "-acodec",
            "pcm_s16le",
            "-ac",
            "1",
            "-ar",
            sample_rate.as_str(),
            "-f",
            "s16le",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

/// Runs `ffmpeg` (or a compatible program) as the decoder.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    program: String,
}

impl FfmpegDecoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new(defaults::FFMPEG_PROGRAM)
    }
}

impl AudioDecoder for FfmpegDecoder {
    fn spawn(&self, url: &str) -> Result<DecodedAudio> {
        let command = DecoderCommand::new(self.program.as_str(), url);

        let mut child = Command::new(&command.program)
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CohostError::Spawn {
                message: format!("{}: {}", command.program, e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| CohostError::Spawn {
            message: "decoder stdout not captured".to_string(),
        })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("ffmpeg: {}", line);
                }
            });
        }

        debug!("Decoder started pid={:?} url={}", child.id(), url);

        let exit = Box::pin(async move {
            match child.wait().await {
                Ok(status) => DecoderExit::Status(status.code()),
                Err(e) => DecoderExit::WaitFailed(e.to_string()),
            }
        });

        Ok(DecodedAudio {
            stream: Box::new(stdout),
            exit,
        })
    }
}

/// Controls a [`MockDecoder`]'s output and exit.
pub struct MockDecoderHandle {
    /// Bytes written here come out of the decoded stream.
    pub audio: DuplexStream,
    exit: oneshot::Sender<DecoderExit>,
}

impl MockDecoderHandle {
    /// Makes the decoder report `exit`.
    pub fn exit(self, exit: DecoderExit) -> DuplexStream {
        if self.exit.send(exit).is_err() {
            debug!("Mock decoder exit dropped: decoder already gone");
        }
        self.audio
    }
}

/// In-memory decoder for tests. Can be spawned once.
pub struct MockDecoder {
    pending: Mutex<Option<(DuplexStream, oneshot::Receiver<DecoderExit>)>>,
    spawn_error: Option<String>,
    spawns: AtomicUsize,
}

impl MockDecoder {
    /// Creates a decoder and the handle feeding it.
    pub fn new() -> (Self, MockDecoderHandle) {
        let (reader, writer) = tokio::io::duplex(64 * 1024);
        let (exit_tx, exit_rx) = oneshot::channel();
        let decoder = Self {
            pending: Mutex::new(Some((reader, exit_rx))),
            spawn_error: None,
            spawns: AtomicUsize::new(0),
        };
        let handle = MockDecoderHandle {
            audio: writer,
            exit: exit_tx,
        };
        (decoder, handle)
    }

    /// A decoder whose spawn always fails.
    pub fn failing(message: &str) -> Self {
        Self {
            pending: Mutex::new(None),
            spawn_error: Some(message.to_string()),
            spawns: AtomicUsize::new(0),
        }
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

impl AudioDecoder for MockDecoder {
    fn spawn(&self, _url: &str) -> Result<DecodedAudio> {
        self.spawns.fetch_add(1, Ordering::SeqCst);

        if let Some(ref message) = self.spawn_error {
            return Err(CohostError::Spawn {
                message: message.clone(),
            });
        }

        let (reader, exit_rx) = self
            .pending
            .lock()
            .map_err(|_| CohostError::Other("mock decoder lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| CohostError::Spawn {
                message: "mock decoder already spawned".to_string(),
            })?;

        let exit = Box::pin(async move {
            match exit_rx.await {
                Ok(exit) => exit,
                // Handle dropped without an exit: keep "running".
                Err(_) => std::future::pending().await,
            }
        });

        Ok(DecodedAudio {
            stream: Box::new(reader),
            exit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_decoder_args() {
        let command = DecoderCommand::new("ffmpeg", "https://example.com/live.m3u8");
        let args = command.args();
        assert_eq!(args[0..2], ["-loglevel", "warning"]);
        assert!(args.windows(2).any(|w| w == ["-acodec", "pcm_s16le"]));
        assert!(args.windows(2).any(|w| w == ["-ac", "1"]));
        assert!(args.windows(2).any(|w| w == ["-ar", "16000"]));
        assert!(args.windows(2).any(|w| w == ["-f", "s16le"]));

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "https://example.com/live.m3u8");
        for option in [
            "-reconnect",
            "-reconnect_at_eof",
            "-reconnect_streamed",
            "-reconnect_delay_max",
        ] {
            let at = args.iter().position(|a| a == option).unwrap();
            assert!(at < input, "{} must configure the input", option);
            assert_eq!(args[at + 1], "0");
        }
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_decoder_exit_display() {
        assert_eq!(
            DecoderExit::Status(Some(1)).to_string(),
            "decoder exited with code 1"
        );
        assert_eq!(
            DecoderExit::Status(None).to_string(),
            "decoder terminated by signal"
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let decoder = FfmpegDecoder::new("/nonexistent/cohost-test-decoder");
        let result = decoder.spawn("http://localhost/stream");
        assert!(matches!(result, Err(CohostError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_exit_is_reported() {
        // `true` ignores its arguments and exits immediately.
        let decoder = FfmpegDecoder::new("true");
        let mut audio = decoder.spawn("http://localhost/stream").unwrap();

        let mut buf = Vec::new();
        audio.stream.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
        assert_eq!(audio.exit.await, DecoderExit::Status(Some(0)));
    }

    #[tokio::test]
    async fn test_mock_decoder_streams_and_exits() {
        let (decoder, mut handle) = MockDecoder::new();
        let mut audio = decoder.spawn("mock://").unwrap();

        handle.audio.write_all(&[1, 2, 3]).await.unwrap();
        let mut buf = [0u8; 3];
        audio.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3]);

        let _writer = handle.exit(DecoderExit::Status(Some(0)));
        assert_eq!(audio.exit.await, DecoderExit::Status(Some(0)));
        assert!(decoder.spawn("mock://").is_err());
        assert_eq!(decoder.spawns(), 2);
    }

    #[test]
    fn test_failing_mock_decoder() {
        let decoder = MockDecoder::failing("no such file");
        assert!(matches!(
            decoder.spawn("mock://"),
            Err(CohostError::Spawn { .. })
        ));
    }
}
