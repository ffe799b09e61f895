//! Conversion between attribute/element text and typed values.
//!
//! The pull parser uses [`ValueTraits::parse`] for `attribute::<T>()` and
//! `element::<T>()`; the serializer uses [`ValueTraits::serialize`] for
//! `attribute()` and `element()`. Implement the trait for your own types
//! to read and write them directly.

pub trait ValueTraits: Sized {
    /// Parse `text`; the error is a description of what was wrong
    fn parse(text: &str) -> Result<Self, String>;

    fn serialize(&self) -> String;
}

impl ValueTraits for String {
    fn parse(text: &str) -> Result<Self, String> {
        Ok(text.to_string())
    }

    fn serialize(&self) -> String {
        self.clone()
    }
}

impl ValueTraits for bool {
    fn parse(text: &str) -> Result<Self, String> {
        match text.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(format!("invalid bool value '{}'", other)),
        }
    }

    fn serialize(&self) -> String {
        if *self { "true" } else { "false" }.to_string()
    }
}

impl ValueTraits for char {
    fn parse(text: &str) -> Result<Self, String> {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(format!("invalid char value '{}'", text)),
        }
    }

    fn serialize(&self) -> String {
        self.to_string()
    }
}

macro_rules! impl_value_traits_from_str {
    ($($t:ty),*) => {
        $(
            impl ValueTraits for $t {
                fn parse(text: &str) -> Result<Self, String> {
                    text.trim()
                        .parse::<$t>()
                        .map_err(|_| format!("invalid {} value '{}'", stringify!($t), text))
                }

                fn serialize(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_value_traits_from_str!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);
