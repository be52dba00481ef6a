use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use tracing::{debug, warn};
use unichat_core::SpeechSink;

/// Speaks through an external program, e.g. `say` or `espeak`. The text is
/// passed as the last argument.
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl CommandSpeech {
    /// Splits the command line with shell quoting rules. Returns `None` for a
    /// blank or unparsable command line.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let Some(parts) = shlex::split(command_line) else {
            warn!(command = command_line, "speech command has unbalanced quotes");
            return None;
        };
        let mut parts = parts.into_iter();
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            child: Mutex::new(None),
        })
    }

    fn stop_current(slot: &mut Option<Child>) {
        if let Some(mut child) = slot.take() {
            if let Ok(None) = child.try_wait() {
                if let Err(error) = child.kill() {
                    debug!(%error, "speech process already gone");
                }
            }
            if let Err(error) = child.wait() {
                debug!(%error, "failed to reap speech process");
            }
        }
    }
}

impl SpeechSink for CommandSpeech {
    fn speak(&self, text: &str) {
        let mut slot = self.child.lock().expect("speech process lock poisoned");
        Self::stop_current(&mut slot);
        match Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => *slot = Some(child),
            Err(error) => warn!(program = %self.program, %error, "failed to start speech command"),
        }
    }

    fn cancel(&self) {
        let mut slot = self.child.lock().expect("speech process lock poisoned");
        Self::stop_current(&mut slot);
    }
}
