use std::fmt::Display;

use miette::miette;

#[derive(Debug)]
pub enum Error {
    /// Missing or unreadable input, invalid settings. Raised before scheduling.
    Configuration(String),

    /// Some group entries could not be matched against the catalog.
    /// Each one has already been reported, this only carries their count.
    Resolution(usize),

    /// An external program could not be started at all.
    Launch {
        program: String,
        source: std::io::Error,
    },

    /// An external program ran but exited with a non-0 status.
    Finalize {
        program: String,
        code: Option<i32>,
        what: String,
    },

    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Miette(miette::Report::msg(err))
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::Configuration(msg) => miette!("{msg}"),
            Error::Resolution(count) => {
                miette!("{count} collection entries could not be resolved against the catalog")
            }
            Error::Launch { program, source } => {
                miette!("Failed to start the {program} process: {source}")
            }
            Error::Finalize {
                program,
                code: Some(code),
                what,
            } => miette!("{program} failed to {what} (exit code {code})"),
            Error::Finalize {
                program,
                code: None,
                what,
            } => miette!("{program} failed to {what} (terminated by a signal)"),
            Error::Miette(err) => err,
        }
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }
}

/// Shorthand for returning a catch-all error from a message
pub fn bail<T, D>(msg: D) -> Result<T>
where
    D: Display + std::fmt::Debug + Send + Sync + 'static,
{
    Err(Error::Miette(miette::Report::msg(msg)))
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_err_only_touches_catch_all_reports() {
        let err = Error::Configuration("missing csv".into()).wrap_err_with(|| "ignored");
        assert!(matches!(err, Error::Configuration(msg) if msg == "missing csv"));

        let err = Error::from(miette!("inner")).wrap_err_with(|| "outer");
        let report = miette::Report::from(err);
        assert_eq!(report.to_string(), "outer");
    }

    #[test]
    fn finalize_report_names_program_and_code() {
        let report = miette::Report::from(Error::Finalize {
            program: "TwitchDownloaderCLI".into(),
            code: Some(3),
            what: "download a video".into(),
        });
        assert_eq!(
            report.to_string(),
            "TwitchDownloaderCLI failed to download a video (exit code 3)"
        );
    }
}
