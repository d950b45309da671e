use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::entry::Entry;

// Borrowed and owned views of the same record shape; bincode encodes a
// borrowed byte slice and a Vec<u8> identically, so the two round-trip.
#[derive(Serialize)]
struct RecordRef<'a, T> {
	key: &'a [u8],
	value: &'a T,
	expire_at: Timestamp,
}

#[derive(Deserialize)]
struct Record<T> {
	key: Vec<u8>,
	value: T,
	expire_at: Timestamp,
}

/// Encode or I/O failure, split so callers can surface distinct error
/// kinds for a corrupt stream versus a rejecting sink.
#[derive(Debug)]
pub(crate) enum CodecFailure {
	Codec(bincode::Error),
	Io(io::Error),
}

/// Append one self-delimited record to the sink.
pub(crate) fn encode<T, W>(w: &mut W, entry: &Entry<T>) -> Result<(), CodecFailure>
where
	T: Serialize,
	W: Write,
{
	bincode::serialize_into(
		&mut *w,
		&RecordRef {
			key: entry.key(),
			value: entry.value(),
			expire_at: entry.expire_at(),
		},
	)
	.map_err(split)
}

/// Decode the next record, or `None` at a clean end of input.
///
/// One byte of lookahead distinguishes exhaustion at a record boundary
/// from a truncated record, which is reported as a codec failure.
pub(crate) fn decode<T, R>(r: &mut R) -> Result<Option<Entry<T>>, CodecFailure>
where
	T: DeserializeOwned,
	R: Read,
{
	let mut first = [0u8; 1];

	loop {
		match r.read(&mut first) {
			Ok(0) => return Ok(None),
			Ok(_) => break,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(CodecFailure::Io(e)),
		}
	}

	let mut source = first.as_slice().chain(&mut *r);

	match bincode::deserialize_from::<_, Record<T>>(&mut source) {
		Ok(record) => Ok(Some(Entry::from_parts(
			record.key.into_boxed_slice(),
			record.value,
			record.expire_at,
		))),
		Err(e) => Err(split(e)),
	}
}

fn split(err: bincode::Error) -> CodecFailure {
	match *err {
		bincode::ErrorKind::Io(e) => CodecFailure::Io(e),
		kind => CodecFailure::Codec(Box::new(kind)),
	}
}
