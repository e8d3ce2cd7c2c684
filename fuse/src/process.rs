use std::{ffi::OsStr, fmt, io, num::NonZeroI32, process};

use log::debug;

pub struct Command(process::Command);

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Command {
    /// Renders the command line the way a user would type it, without quoting.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.get_program().to_string_lossy())?;
        for arg in self.0.get_args() {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn args<'a, I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = &'a OsStr>,
    {
        self.0.args(args);
        self
    }

    pub fn program(&self) -> &OsStr {
        self.0.get_program()
    }

    /// Runs the command to completion and captures its output, regardless of the exit status.
    pub fn try_output(mut self) -> Result<Output, Error> {
        debug!("running `{self}`...");

        match self.0.output() {
            Ok(output) => Ok(Output {
                command: self,
                output,
            }),
            Err(error) => Err(Error {
                command: self,
                kind: error.into(),
            }),
        }
    }
}

#[derive(Debug)]
pub struct Output {
    pub command: Command,
    pub output: process::Output,
}

impl Output {
    pub fn success(&self) -> bool {
        self.output.status.success()
    }

    pub fn exit_code(&self) -> Option<NonZeroI32> {
        self.output.status.code().and_then(NonZeroI32::new)
    }

    /// Standard output followed by standard error.
    pub fn combined(&self) -> Vec<u8> {
        let mut combined = Vec::with_capacity(self.output.stdout.len() + self.output.stderr.len());
        combined.extend_from_slice(&self.output.stdout);
        combined.extend_from_slice(&self.output.stderr);
        combined
    }
}

impl std::ops::Deref for Output {
    type Target = process::Output;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Io(io::Error),
    NonZeroExitStatus(Option<NonZeroI32>),
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Io(value),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to run `{command}`: ", command = &self.command)?;
        let program = self.command.program().to_string_lossy();
        match &self.kind {
            ErrorKind::NotFound => {
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::Io(error) => write!(f, "{error}"),
            ErrorKind::NonZeroExitStatus(code) => {
                if let Some(code) = code {
                    write!(f, "exited with non-zero exit code `{code}`")
                } else {
                    write!(f, "did not run succesfully")
                }
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            _ => None,
        }
    }
}

/// Creates a new [`Command`] and supplies the provided arguments, if any, while calling
/// [`std::convert::AsRef::as_ref`] on each.
macro_rules! command {
    ($program:expr $(, $arg:expr)* $(,)?) => {
        $crate::process::args!($crate::process::Command::new($program) $(, $arg)*)
    };
}

/// Calls [`Command::args`] on the provided [`Command`] while calling [`std::convert::AsRef::as_ref`]
/// on each argument.
macro_rules! args {
    ($program:expr $(, $arg:expr)* $(,)?) => {
        $program.args([
            $(::std::convert::AsRef::<::std::ffi::OsStr>::as_ref(&$arg),)*
        ])
    }
}

pub(crate) use args;
pub(crate) use command;
