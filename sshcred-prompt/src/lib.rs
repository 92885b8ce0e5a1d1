//! Password prompting for encrypted keys.
//!
//! A [`Prompter`] asks one question and returns one line.  [`IoPrompter`]
//! implements it over any reader/writer pair; when the reader is a terminal
//! and echo is off, typed characters are not shown.  [`TtyPrompter`] talks to
//! the controlling terminal directly, for when stdin is busy carrying data.
//! [`unlock_signer`] drives a prompter until a key decrypts.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal as _, Read, Write};
use std::os::fd::AsFd;
use std::path::PathBuf;

use zeroize::{Zeroize as _, Zeroizing};

mod template;
mod tty;
mod unlock;

pub use template::{PromptContext, render_template};
pub use unlock::{UnlockError, UnlockOptions, unlock_signer};

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("prompt I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("end of input while waiting for an answer")]
    Eof,

    #[error("answer is not valid UTF-8")]
    InvalidUtf8,
}

/// Something that can ask the user a question.
pub trait Prompter {
    /// Show `question` and read one line.  With `echo == false` the answer
    /// should not be displayed as it is typed.
    fn prompt(&mut self, question: &str, echo: bool) -> Result<Zeroizing<String>, PromptError>;
}

impl<P: Prompter + ?Sized> Prompter for &mut P {
    fn prompt(&mut self, question: &str, echo: bool) -> Result<Zeroizing<String>, PromptError> {
        (**self).prompt(question, echo)
    }
}

/// A [`Prompter`] over an input stream and an output stream.
///
/// Input is consumed one byte at a time up to the newline, so several prompts
/// can share one stream without reading ahead into each other's answers.
#[derive(Debug)]
pub struct IoPrompter<R, W> {
    input: R,
    output: W,
}

/// Build a prompter reading from `input` and writing questions to `output`.
pub fn io_prompt<R: Read + AsFd, W: Write>(input: R, output: W) -> IoPrompter<R, W> {
    IoPrompter { input, output }
}

/// A prompter on the process's stdin and stdout.
pub fn std_prompter() -> IoPrompter<io::Stdin, io::Stdout> {
    io_prompt(io::stdin(), io::stdout())
}

impl<R, W> IoPrompter<R, W> {
    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl<R: Read + AsFd, W: Write> IoPrompter<R, W> {
    fn read_line(&mut self) -> Result<Zeroizing<Vec<u8>>, PromptError> {
        let mut line = Zeroizing::new(Vec::new());
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => {
                    if line.is_empty() {
                        return Err(PromptError::Eof);
                    }
                    break;
                }
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        byte.zeroize();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(line)
    }
}

impl<R: Read + AsFd, W: Write> Prompter for IoPrompter<R, W> {
    fn prompt(&mut self, question: &str, echo: bool) -> Result<Zeroizing<String>, PromptError> {
        self.output.write_all(question.as_bytes())?;
        self.output.flush()?;

        let hidden = !echo && self.input.as_fd().is_terminal();
        let line = if hidden {
            let guard = tty::echo_off(self.input.as_fd())?;
            let line = self.read_line();
            drop(guard);
            // The user's Enter was not echoed.
            self.output.write_all(b"\n")?;
            self.output.flush()?;
            line?
        } else {
            self.read_line()?
        };

        let text = std::str::from_utf8(&line).map_err(|_| PromptError::InvalidUtf8)?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

/// The controlling terminal of the current process.
pub const TTY_PATH: &str = "/dev/tty";

/// A [`Prompter`] on the controlling terminal.
///
/// The device is opened for each question and closed again afterwards, so a
/// process with no terminal only fails if it is actually asked something.
#[derive(Debug, Clone)]
pub struct TtyPrompter {
    path: PathBuf,
}

impl TtyPrompter {
    pub fn new() -> Self {
        Self::at(TTY_PATH)
    }

    /// Prompt on `path` instead of [`TTY_PATH`].
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for TtyPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TtyPrompter {
    fn prompt(&mut self, question: &str, echo: bool) -> Result<Zeroizing<String>, PromptError> {
        let input = File::open(&self.path)?;
        let output = OpenOptions::new().append(true).open(&self.path)?;
        io_prompt(input, output).prompt(question, echo)
    }
}
