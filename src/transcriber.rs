//! Transcriber for the worker
//!
//! The speech-to-text model is an external collaborator. [`Transcriber`] is the seam the
//! worker uses; [`CommandTranscriber`] drives an external command, the same way the model
//! is usually wrapped in a small script next to the worker.
//!
//! The command is called as
//! `<command> <audio file> --model <model> --model_dir <models dir>/<model> --device <device>`
//! and must write JSON lines to stdout. The first line describes the audio:
//!
//! ```text
//! {"language": "en", "duration": 5.0}
//! ```
//!
//! Every following line is a segment, written as soon as the model produces it:
//!
//! ```text
//! {"start": 0.0, "end": 2.0, "text": " hello"}
//! ```

use log::{debug, warn};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use thiserror::Error;

use crate::models::Segment;

/// Transcriber error types
#[derive(Error, Debug)]
pub enum TranscribeError {
    /// Command could not be started
    #[error("Failed to run command {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// I/O error while reading the command's output
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// Output line that is not valid JSON for its position
    #[error("Malformed transcriber output {line:?}: {source}")]
    MalformedOutput {
        line: String,
        source: serde_json::Error,
    },
    /// Command ended before describing the audio
    #[error("Transcriber produced no output")]
    MissingInfo,
    /// Command exited unsuccessfully
    #[error("Transcriber exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    /// Transcription thread panicked or was cancelled
    #[error("Transcription aborted: {0}")]
    Aborted(String),
}

/// Overall information about a transcribed file
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TranscriptionInfo {
    /// Detected language code
    pub language: String,
    /// Total audio duration in seconds
    pub duration: f64,
}

/// Single-pass sequence of segments, produced while the model runs
pub type SegmentStream = Box<dyn Iterator<Item = Result<Segment, TranscribeError>> + Send>;

/// A transcription in progress
pub struct Transcription {
    pub info: TranscriptionInfo,
    pub segments: SegmentStream,
}

/// Speech-to-text capability used by the worker
pub trait Transcriber: Send + Sync {
    /// Library identifier reported with every result
    fn library(&self) -> &str;

    /// Start transcribing `audio_file`.
    ///
    /// Blocks until the audio has been described; segments are produced lazily afterwards.
    fn transcribe(&self, audio_file: &Path) -> Result<Transcription, TranscribeError>;
}

/// Transcriber backed by an external command speaking JSON lines
#[derive(Clone, Debug)]
pub struct CommandTranscriber {
    /// Path to the command
    pub command_path: PathBuf,
    /// Model name passed with `--model`
    pub model: String,
    /// Models root; the model directory below it is passed with `--model_dir`
    pub models_dir: PathBuf,
    /// Device passed with `--device`
    pub device: String,
    /// Library identifier reported with results
    pub library: String,
}

#[derive(Deserialize)]
struct RawSegment {
    start: f64,
    end: f64,
    text: String,
}

impl Transcriber for CommandTranscriber {
    fn library(&self) -> &str {
        &self.library
    }

    fn transcribe(&self, audio_file: &Path) -> Result<Transcription, TranscribeError> {
        let mut command = Command::new(&self.command_path);
        command
            .arg(audio_file)
            .arg("--model")
            .arg(&self.model)
            .arg("--model_dir")
            .arg(self.models_dir.join(&self.model))
            .arg("--device")
            .arg(&self.device)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running transcriber: {:?}", command);

        let mut child = command.spawn().map_err(|source| TranscribeError::Spawn {
            command: self.command_path.display().to_string(),
            source,
        })?;

        let stderr = child.stderr.take().map(collect_stderr);
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                return Err(TranscribeError::Aborted("stdout not captured".to_string()));
            }
        };

        let mut output = CommandOutput {
            lines: BufReader::new(stdout).lines(),
            child: Some(child),
            stderr,
        };

        let info = match output.next_line() {
            Some(Ok(line)) => serde_json::from_str::<TranscriptionInfo>(&line)
                .map_err(|source| TranscribeError::MalformedOutput { line, source }),
            Some(Err(e)) => Err(e),
            None => Err(output.finish().err().unwrap_or(TranscribeError::MissingInfo)),
        }?;

        Ok(Transcription {
            info,
            segments: Box::new(output),
        })
    }
}

/// Read stderr on its own thread so a chatty command never blocks on a full pipe
fn collect_stderr(mut stderr: impl Read + Send + 'static) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut text = String::new();
        if let Err(e) = stderr.read_to_string(&mut text) {
            warn!("Failed to read transcriber stderr: {}", e);
        }
        text
    })
}

/// Stdout of a running transcriber command, yielding segments
struct CommandOutput {
    lines: Lines<BufReader<ChildStdout>>,
    /// `None` once the process has been waited for
    child: Option<Child>,
    stderr: Option<JoinHandle<String>>,
}

impl CommandOutput {
    /// Next non-blank line, or `None` at end of output
    fn next_line(&mut self) -> Option<Result<String, TranscribeError>> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(Ok(line)),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    /// Wait for the process and turn a failed exit into an error
    fn finish(&mut self) -> Result<(), TranscribeError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(TranscribeError::Failed {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

impl Iterator for CommandOutput {
    type Item = Result<Segment, TranscribeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.child.as_ref()?;

        match self.next_line() {
            Some(Ok(line)) => Some(
                serde_json::from_str::<RawSegment>(&line)
                    .map(|raw| Segment::new(raw.start, raw.end, &raw.text))
                    .map_err(|source| TranscribeError::MalformedOutput { line, source }),
            ),
            Some(Err(e)) => Some(Err(e)),
            None => self.finish().err().map(Err),
        }
    }
}

impl Drop for CommandOutput {
    fn drop(&mut self) {
        // Consumer stopped early: don't leave the model running
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::TempDir;

    // Writing a script while another test forks can fail its exec with ETXTBSY
    static SCRIPTS: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        SCRIPTS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn script(dir: &TempDir, body: &str) -> CommandTranscriber {
        let path = dir.path().join("transcribe.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        CommandTranscriber {
            command_path: path,
            model: "tiny".to_string(),
            models_dir: dir.path().join("models"),
            device: "cpu".to_string(),
            library: "faster-whisper".to_string(),
        }
    }

    #[test]
    fn test_streams_segments_from_json_lines() {
        let _guard = serial();
        let dir = TempDir::new().unwrap();
        let transcriber = script(
            &dir,
            r#"echo '{"language": "en", "duration": 5.0}'
echo ''
echo '{"start": 0.0, "end": 2.0, "text": " hello"}'
echo '{"start": 2.0, "end": 5.0, "text": "world  "}'"#,
        );

        let transcription = transcriber.transcribe(&dir.path().join("abc")).unwrap();
        assert_eq!(
            transcription.info,
            TranscriptionInfo {
                language: "en".to_string(),
                duration: 5.0
            }
        );

        let segments: Vec<Segment> = transcription
            .segments
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            segments,
            vec![Segment::new(0.0, 2.0, "hello"), Segment::new(2.0, 5.0, "world")]
        );
    }

    #[test]
    fn test_passes_arguments_to_command() {
        let _guard = serial();
        let dir = TempDir::new().unwrap();
        let transcriber = script(
            &dir,
            r#"echo '{"language": "en", "duration": 1.0}'
printf '{"start": 0.0, "end": 1.0, "text": "%s|%s|%s|%s|%s|%s|%s"}\n' "$1" "$2" "$3" "$4" "$(basename "$5")" "$6" "$7""#,
        );

        let transcription = transcriber.transcribe(Path::new("audio-file")).unwrap();
        let segments: Vec<Segment> = transcription
            .segments
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            segments[0].text,
            "audio-file|--model|tiny|--model_dir|tiny|--device|cpu"
        );
    }

    #[test]
    fn test_failed_exit_surfaces_stderr() {
        let _guard = serial();
        let dir = TempDir::new().unwrap();
        let transcriber = script(
            &dir,
            r#"echo '{"language": "de", "duration": 3.0}'
echo '{"start": 0.0, "end": 1.0, "text": "hallo"}'
echo 'CUDA out of memory' >&2
exit 3"#,
        );

        let mut segments = transcriber.transcribe(Path::new("x")).unwrap().segments;
        assert!(segments.next().unwrap().is_ok());
        match segments.next() {
            Some(Err(TranscribeError::Failed { stderr, .. })) => {
                assert_eq!(stderr, "CUDA out of memory")
            }
            other => panic!("expected failure, got {:?}", other.map(|r| r.is_ok())),
        }
        assert!(segments.next().is_none());
    }

    #[test]
    fn test_no_output_is_an_error() {
        let _guard = serial();
        let dir = TempDir::new().unwrap();

        let silent = script(&dir, "exit 0");
        assert!(matches!(
            silent.transcribe(Path::new("x")),
            Err(TranscribeError::MissingInfo)
        ));

        let crashing = script(&dir, "echo 'no such file' >&2\nexit 1");
        assert!(matches!(
            crashing.transcribe(Path::new("x")),
            Err(TranscribeError::Failed { .. })
        ));
    }

    #[test]
    fn test_malformed_segment_line() {
        let _guard = serial();
        let dir = TempDir::new().unwrap();
        let transcriber = script(
            &dir,
            r#"echo '{"language": "en", "duration": 1.0}'
echo 'Loading model...'"#,
        );

        let mut segments = transcriber.transcribe(Path::new("x")).unwrap().segments;
        assert!(matches!(
            segments.next(),
            Some(Err(TranscribeError::MalformedOutput { .. }))
        ));
    }

    #[test]
    fn test_dropping_output_kills_command() {
        let _guard = serial();
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let transcriber = script(
            &dir,
            &format!(
                "echo '{{\"language\": \"en\", \"duration\": 60.0}}'\nsleep 2\ntouch '{}'",
                marker.display()
            ),
        );

        let transcription = transcriber.transcribe(Path::new("x")).unwrap();
        assert_eq!(transcription.info.language, "en");
        drop(transcription);

        std::thread::sleep(std::time::Duration::from_secs(3));
        assert!(!marker.exists());
    }

    #[test]
    fn test_missing_command() {
        let transcriber = CommandTranscriber {
            command_path: PathBuf::from("/nonexistent/transcribe"),
            model: "tiny".to_string(),
            models_dir: PathBuf::from("/nonexistent"),
            device: "cpu".to_string(),
            library: "faster-whisper".to_string(),
        };
        assert!(matches!(
            transcriber.transcribe(Path::new("x")),
            Err(TranscribeError::Spawn { .. })
        ));
    }
}
