// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2023 Takashi Sakamoto

use {
    super::{LogLevel, RuntimeOperation},
    alsactl::CardError,
    clap::Parser,
    glib::{Error, FileError},
};

pub trait ServiceCmd<A, T, R>: Sized
where
    A: Parser,
    R: RuntimeOperation<T>,
{
    fn params(args: &A) -> (T, Option<LogLevel>);

    fn run() {
        let code = A::try_parse()
            .map_err(|err| err.to_string())
            .map(|args| Self::params(&args))
            .and_then(|(params, log_level)| {
                R::new(params, log_level)
                    .and_then(|mut runtime| {
                        runtime.listen()?;
                        runtime.run()?;
                        Ok(libc::EXIT_SUCCESS)
                    })
                    .map_err(|err| specific_err_to_string(&err))
            })
            .unwrap_or_else(|msg| {
                eprintln!("{}", msg);
                libc::EXIT_FAILURE
            });

        std::process::exit(code)
    }
}

fn specific_err_to_string(e: &Error) -> String {
    let (domain, cause) = if let Some(error) = e.kind::<FileError>() {
        (
            "Linux file operation error",
            match error {
                FileError::Acces => "Access permission",
                FileError::Isdir => "Is directory",
                FileError::Noent => "Not exists",
                FileError::Nxio => "Not configured",
                _ => "",
            },
        )
    } else if let Some(error) = e.kind::<CardError>() {
        (
            "ALSA control operation error",
            match error {
                CardError::Disconnected => "Sound card is disconnected",
                _ => "",
            },
        )
    } else {
        ("Unknown domain error", "")
    };
    format!("{}: {}, {}", domain, cause, e)
}
