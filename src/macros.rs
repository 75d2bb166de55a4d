// src/macros.rs

/// String shorthand: `s!()` is an empty `String`, `s!(x)` is `String::from(x)`.
#[macro_export]
macro_rules! s {
    () => {
        ::std::string::String::new()
    };
    ($expr:expr) => {
        ::std::string::String::from($expr)
    };
}

/// Concatenate string slices into a fresh `String`.
#[macro_export]
macro_rules! join {
    ($first:expr $(, $rest:expr)+ $(,)?) => {{
        let mut s = ::std::string::String::from($first);
        $(
            s.push_str($rest);
        )+
        s
    }};
}

/// Early-return a `HarvestError::Config` built from a format string.
#[macro_export]
macro_rules! bail_config {
    ($($arg:tt)*) => {
        return ::std::result::Result::Err(
            $crate::error::HarvestError::Config(::std::format!($($arg)*))
        )
    };
}
