pub mod convert;
pub mod dls;
pub mod inspect;
pub mod riff;
pub mod sf2;
pub mod wave;

pub use dls::DownloadableSounds;
pub use sf2::SoundFont;
pub use wave::Wave;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required chunk is absent, a chunk has an unexpected size, or a
    /// field does not match the expected layout.
    #[error("format error: {0}")]
    Format(String),
    /// A wave or sample index points outside the declared pool.
    #[error("{what} index {index} out of range (pool has {len})")]
    Index {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// The data is well-formed but uses a feature this crate does not read.
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    #[inline]
    pub(crate) fn format(args: impl std::fmt::Display) -> Self {
        Self::Format(args.to_string())
    }
    #[inline]
    pub(crate) fn missing_chunk(name: &str) -> Self {
        Self::Format(format!("required chunk `{name}` is missing"))
    }
}

#[inline]
fn too_large<'a, E: nom::error::ParseError<&'a [u8]>>(input: &'a [u8]) -> nom::Err<E> {
    nom::Err::Error(nom::error::make_error(
        input,
        nom::error::ErrorKind::TooLarge,
    ))
}

#[inline]
fn nom_fail<'a, E: nom::error::ParseError<&'a [u8]>>(input: &'a [u8]) -> nom::Err<E> {
    nom::Err::Error(nom::error::make_error(input, nom::error::ErrorKind::Fail))
}

fn convert_error<I: std::ops::Deref<Target = [u8]>>(
    input: I,
    e: nom::Err<nom::error::VerboseError<I>>,
) -> String {
    use std::fmt::Write;

    let e = match e {
        nom::Err::Incomplete(nom::Needed::Unknown) => return "Incomplete".into(),
        nom::Err::Incomplete(nom::Needed::Size(n)) => return format!("Need {n} more bytes"),
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
    };
    let mut result = String::new();
    for (i, (substring, kind)) in e.errors.iter().enumerate() {
        let offset = nom::Offset::offset(&*input, substring);

        if i == 0 {
            write!(&mut result, "Parse error at position 0x{offset:x}")
        } else {
            write!(&mut result, ", 0x{offset:x}")
        }
        .unwrap();

        match kind {
            nom::error::VerboseErrorKind::Char(_) => unreachable!(),
            nom::error::VerboseErrorKind::Context(context) => write!(&mut result, " in {context}",),
            nom::error::VerboseErrorKind::Nom(err) => write!(&mut result, " ({err:?})",),
        }
        .unwrap();
    }
    result
}

#[inline]
fn is_log_level(lvl: log::LevelFilter) -> bool {
    lvl <= log::STATIC_MAX_LEVEL && lvl <= log::max_level()
}
