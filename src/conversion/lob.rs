use std::io::Cursor;

use super::text::utf8;
use super::{ConversionContext, mismatch};
use crate::error::Result;
use crate::types::{HostValue, LobReference, TargetKind, WireValue};

/// Opens large objects on demand.
///
/// Implemented by the object that owns the remote resources (a result cursor).
/// Conversion contexts only hold a `Weak` to it.
pub trait LobReader: Send + Sync {
    /// Read the full contents of `lob`.
    ///
    /// # Errors
    /// Returns a `DriverError` if the transport fails or the owner is closed.
    fn read_lob(&self, lob: &LobReference) -> Result<Vec<u8>>;
}

fn octets(value: &WireValue, ctx: &ConversionContext) -> Result<Option<Vec<u8>>> {
    match value {
        WireValue::Octet(bytes) => Ok(Some(bytes.clone())),
        WireValue::Blob(lob) => ctx.read_lob(lob).map(Some),
        _ => Ok(None),
    }
}

fn characters(
    value: &WireValue,
    ctx: &ConversionContext,
    target: TargetKind,
) -> Result<Option<String>> {
    match value {
        WireValue::Character(s) => Ok(Some(s.clone())),
        WireValue::Clob(lob) => utf8(ctx.read_lob(lob)?, target).map(Some),
        _ => Ok(None),
    }
}

pub(super) fn to_bytes(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Bytes;
    match octets(value, ctx)? {
        Some(bytes) => Ok(HostValue::Bytes(bytes)),
        None => mismatch(value, target),
    }
}

pub(super) fn to_binary_stream(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::BinaryStream;
    match octets(value, ctx)? {
        Some(bytes) => Ok(HostValue::ByteStream(Cursor::new(bytes))),
        None => mismatch(value, target),
    }
}

/// Characters outside ASCII read as `?`.
pub(super) fn to_ascii_stream(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::AsciiStream;
    if let Some(bytes) = octets(value, ctx)? {
        return Ok(HostValue::ByteStream(Cursor::new(bytes)));
    }
    match characters(value, ctx, target)? {
        Some(text) => {
            let ascii = text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect();
            Ok(HostValue::ByteStream(Cursor::new(ascii)))
        }
        None => mismatch(value, target),
    }
}

pub(super) fn to_character_stream(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::CharacterStream;
    match characters(value, ctx, target)? {
        Some(text) => Ok(HostValue::CharacterStream(Cursor::new(text))),
        None => mismatch(value, target),
    }
}

pub(super) fn to_blob(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Blob;
    match octets(value, ctx)? {
        Some(bytes) => Ok(HostValue::Blob(bytes)),
        None => mismatch(value, target),
    }
}

pub(super) fn to_clob(value: &WireValue, ctx: &ConversionContext) -> Result<HostValue> {
    let target = TargetKind::Clob;
    match characters(value, ctx, target)? {
        Some(text) => Ok(HostValue::Clob(text)),
        None => mismatch(value, target),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::{Arc, Weak};

    use super::*;
    use crate::error::DriverError;

    struct FixedLobs;

    impl LobReader for FixedLobs {
        fn read_lob(&self, lob: &LobReference) -> Result<Vec<u8>> {
            match lob.id {
                1 => Ok(vec![0xde, 0xad]),
                2 => Ok("héllo".as_bytes().to_vec()),
                other => Err(DriverError::Execution(format!("no lob {other}"))),
            }
        }
    }

    fn ctx_with(reader: &Arc<dyn LobReader>) -> ConversionContext {
        ConversionContext::default().with_lob_reader(Arc::downgrade(reader))
    }

    #[test]
    fn blob_reads_through_the_reader() {
        let reader: Arc<dyn LobReader> = Arc::new(FixedLobs);
        let ctx = ctx_with(&reader);
        assert_eq!(
            to_bytes(&WireValue::Blob(LobReference::new(1)), &ctx).unwrap(),
            HostValue::Bytes(vec![0xde, 0xad])
        );
        let HostValue::ByteStream(mut stream) =
            to_binary_stream(&WireValue::Blob(LobReference::new(1)), &ctx).unwrap()
        else {
            panic!("expected stream");
        };
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![0xde, 0xad]);
    }

    #[test]
    fn clob_to_ascii_replaces_non_ascii() {
        let reader: Arc<dyn LobReader> = Arc::new(FixedLobs);
        let ctx = ctx_with(&reader);
        let HostValue::ByteStream(stream) =
            to_ascii_stream(&WireValue::Clob(LobReference::new(2)), &ctx).unwrap()
        else {
            panic!("expected stream");
        };
        assert_eq!(stream.into_inner(), b"h?llo".to_vec());
        assert_eq!(
            to_clob(&WireValue::Clob(LobReference::new(2)), &ctx).unwrap(),
            HostValue::Clob("héllo".into())
        );
    }

    #[test]
    fn dropped_owner_closes_the_channel() {
        let reader: Arc<dyn LobReader> = Arc::new(FixedLobs);
        let weak: Weak<dyn LobReader> = Arc::downgrade(&reader);
        drop(reader);
        let ctx = ConversionContext::default().with_lob_reader(weak);
        let err = to_blob(&WireValue::Blob(LobReference::new(1)), &ctx).unwrap_err();
        assert!(matches!(err, DriverError::Closed(_)));
    }

    #[test]
    fn octet_is_not_character_data() {
        let err = to_clob(&WireValue::Octet(vec![1]), &ConversionContext::default()).unwrap_err();
        assert!(matches!(err, DriverError::UnsupportedConversion { .. }));
    }
}
