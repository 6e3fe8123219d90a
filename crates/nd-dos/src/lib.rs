//! DOS-side primitives shared by the netdrive crates.

/// Error when talking to the host filesystem or the wire.
pub type Error = anyhow::Error;

pub mod attr;
pub mod date;
pub mod exterr;
pub mod fcb;
pub mod wire;

/// Convert into an error type including the context.
#[macro_export]
macro_rules! msg2err {
    ($v: expr) => { Error::msg($v).context($crate::ErrorCtx((file!(), line!()))) }
}

/// A container for file! and line! Error context
pub struct ErrorCtx(pub (&'static str, u32));
impl core::fmt::Display for ErrorCtx {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        write!(fmt, "{}:{}", self.0 .0, self.0 .1)
    }
}
