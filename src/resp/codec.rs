//! Component A: request encoding and streaming reply decoding.
//!
//! The decoder is `entangled90-rdis`'s `parser.rs` turned inside out: that parser read client
//! commands with `nom::character::complete` primitives and treated `Err(Incomplete)` as "read
//! more" even though `complete` combinators rarely produce it. Here the primitives are the
//! `streaming` variants, which genuinely signal "not enough bytes yet" — the `Codec` surfaces
//! that as `DecodeOutcome::Incomplete` so `Connection::read_reply` (§4.3) knows to read again
//! instead of treating a short buffer as a protocol violation.

use super::value::RespValue;
use bytes::Bytes;
use nom::{
    bytes::streaming::{take, take_until},
    character::streaming::{char, crlf, digit1},
    combinator::opt,
    sequence::terminated,
    IResult,
};

/// Outcome of one decode attempt over the current read buffer (§4.1).
pub enum DecodeOutcome {
    /// A full value was parsed; `usize` is the number of bytes consumed from the front of the
    /// buffer that the connection must drop (or compact past).
    Complete(RespValue, usize),
    /// Not enough bytes buffered yet; the connection should read more and retry.
    Incomplete,
    /// A framing violation (bad leading byte, non-numeric length, lone CR/LF, ...). Fatal:
    /// the connection must be marked broken.
    Protocol(String),
}

/// Streaming RESP2/RESP3 decoder plus the flat request encoder. Stateless beyond the
/// configured recursion cap, so one `Codec` can be shared (or cheaply cloned) across
/// connections.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    /// Bound on array/map/set/push nesting (§4.1: "bounded recursion with a configurable depth
    /// cap (>=128)").
    max_depth: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Codec { max_depth: 128 }
    }
}

impl Codec {
    pub fn new(max_depth: usize) -> Self {
        Codec {
            max_depth: max_depth.max(1),
        }
    }

    /// Encodes one request frame: `*N\r\n` followed by `$len\r\n<bytes>\r\n` per argument
    /// (§4.1). The caller (command wrappers, out of scope here) is responsible for
    /// stringifying non-byte arguments before calling this.
    pub fn encode_frame<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
        debug_assert!(!args.is_empty(), "a request frame needs >= 1 argument");
        let mut out = Vec::with_capacity(32 + args.iter().map(|a| a.as_ref().len() + 16).sum::<usize>());
        out.push(b'*');
        out.extend_from_slice(args.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        for arg in args {
            let bytes = arg.as_ref();
            out.push(b'$');
            out.extend_from_slice(bytes.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    /// Attempts to decode exactly one RESP value from the front of `buf`. Never allocates for
    /// bulk payloads beyond the single `Bytes::copy_from_slice` that promotes a slice into an
    /// owned value at the moment it leaves the buffer (§9's default "(a) copy eagerly").
    pub fn decode(&self, buf: &[u8]) -> DecodeOutcome {
        match decode_value(buf, 0, self.max_depth) {
            Ok((rest, value)) => DecodeOutcome::Complete(value, buf.len() - rest.len()),
            Err(nom::Err::Incomplete(_)) => DecodeOutcome::Incomplete,
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                DecodeOutcome::Protocol(describe_error(buf, e))
            }
        }
    }

    /// Encodes a full `RespValue` back to wire bytes. Not needed by the blocking client path
    /// (which only ever encodes request frames) but used by tests to build synthetic server
    /// replies and to check the graph decoder's round-trip law (§8).
    pub fn encode_value(value: &RespValue, out: &mut Vec<u8>) {
        match value {
            RespValue::SimpleString(s) => {
                out.push(b'+');
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(i) => {
                out.push(b':');
                out.extend_from_slice(i.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(b) => {
                out.push(b'$');
                out.extend_from_slice(b.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    Codec::encode_value(item, out);
                }
            }
            RespValue::Map(pairs) => {
                out.push(b'%');
                out.extend_from_slice(pairs.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for (k, v) in pairs {
                    Codec::encode_value(k, out);
                    Codec::encode_value(v, out);
                }
            }
            RespValue::Set(items) => {
                out.push(b'~');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    Codec::encode_value(item, out);
                }
            }
            RespValue::Double(d) => {
                out.push(b',');
                out.extend_from_slice(format_double(*d).as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Boolean(b) => {
                out.push(b'#');
                out.push(if *b { b't' } else { b'f' });
                out.extend_from_slice(b"\r\n");
            }
            RespValue::BigNumber(s) => {
                out.push(b'(');
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::VerbatimString { format, payload } => {
                out.push(b'=');
                out.extend_from_slice((payload.len() + 4).to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(format);
                out.push(b':');
                out.extend_from_slice(payload);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Push(items) => {
                out.push(b'>');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    Codec::encode_value(item, out);
                }
            }
            RespValue::Null => out.extend_from_slice(b"_\r\n"),
        }
    }
}

fn format_double(d: f64) -> String {
    if d.is_infinite() {
        if d > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if d.is_nan() {
        "nan".to_string()
    } else {
        d.to_string()
    }
}

fn describe_error(buf: &[u8], err: nom::error::Error<&[u8]>) -> String {
    let lead = buf.first().copied();
    format!(
        "malformed RESP frame near byte {:?} (kind {:?})",
        lead.map(|b| b as char),
        err.code
    )
}

fn decode_value(input: &[u8], depth: usize, max_depth: usize) -> IResult<&[u8], RespValue> {
    if depth > max_depth {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    let (rest, lead) = nom::bytes::streaming::take(1usize)(input)?;
    match lead[0] {
        b'+' => {
            let (rest, line) = read_line(rest)?;
            Ok((rest, RespValue::SimpleString(Bytes::copy_from_slice(line))))
        }
        b'-' => {
            let (rest, line) = read_line(rest)?;
            Ok((rest, RespValue::Error(Bytes::copy_from_slice(line))))
        }
        b':' => {
            let (rest, n) = read_signed_decimal(rest)?;
            Ok((rest, RespValue::Integer(n)))
        }
        b'$' => decode_bulk(rest),
        b'*' => decode_sequence(rest, depth, max_depth, RespValue::Array),
        b'%' => decode_map(rest, depth, max_depth),
        b'~' => decode_sequence(rest, depth, max_depth, RespValue::Set),
        b'>' => decode_sequence(rest, depth, max_depth, RespValue::Push),
        b',' => {
            let (rest, line) = read_line(rest)?;
            let text = std::str::from_utf8(line).map_err(|_| fail(input))?;
            let d = parse_double(text).ok_or_else(|| fail(input))?;
            Ok((rest, RespValue::Double(d)))
        }
        b'#' => {
            let (rest, b) = nom::bytes::streaming::take(1usize)(rest)?;
            let (rest, _) = crlf(rest)?;
            match b[0] {
                b't' => Ok((rest, RespValue::Boolean(true))),
                b'f' => Ok((rest, RespValue::Boolean(false))),
                _ => Err(fail(input)),
            }
        }
        b'(' => {
            let (rest, line) = read_line(rest)?;
            Ok((rest, RespValue::BigNumber(Bytes::copy_from_slice(line))))
        }
        b'=' => decode_verbatim(rest),
        b'_' => {
            let (rest, _) = crlf(rest)?;
            Ok((rest, RespValue::Null))
        }
        _ => Err(fail(input)),
    }
}

fn fail(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Reads up to (not including) the next CRLF and consumes it. Equivalent to the
/// `take_until("\r\n")` + `crlf` pairing in `entangled90-rdis`'s `read_simple`/`read_error`, kept as two calls here
/// because a lone `\r` or `\n` inside the line (without the pair) must fail, not silently pass:
/// `take_until` alone would happily swallow a bare `\r` or `\n` that precedes the real
/// terminator, so the returned line is rescanned for either byte before it is accepted.
fn read_line(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (rest, line) = terminated(take_until("\r\n"), crlf)(input)?;
    if line.iter().any(|&b| b == b'\r' || b == b'\n') {
        return Err(fail(input));
    }
    Ok((rest, line))
}

fn read_positive_decimal(input: &[u8]) -> IResult<&[u8], i64> {
    let (rest, digits) = digit1(input)?;
    let text = std::str::from_utf8(digits).map_err(|_| fail(input))?;
    let n: i64 = text.parse().map_err(|_| fail(input))?;
    Ok((rest, n))
}

fn read_signed_decimal(input: &[u8]) -> IResult<&[u8], i64> {
    let (rest, (minus, n)) = nom::sequence::tuple((opt(char('-')), read_positive_decimal))(input)?;
    let (rest, _) = crlf(rest)?;
    Ok((rest, if minus.is_some() { -n } else { n }))
}

fn decode_bulk(input: &[u8]) -> IResult<&[u8], RespValue> {
    let (rest, len) = read_signed_decimal(input)?;
    if len < 0 {
        return Ok((rest, RespValue::Null));
    }
    let (rest, bytes) = take(len as usize)(rest)?;
    let (rest, _) = crlf(rest)?;
    Ok((rest, RespValue::BulkString(Bytes::copy_from_slice(bytes))))
}

fn decode_verbatim(input: &[u8]) -> IResult<&[u8], RespValue> {
    let (rest, len) = read_signed_decimal(input)?;
    if len < 4 {
        return Err(fail(input));
    }
    let (rest, body) = take(len as usize)(rest)?;
    let (rest, _) = crlf(rest)?;
    let (fmt_bytes, tail) = body.split_at(3);
    let tail = tail.strip_prefix(b":").ok_or_else(|| fail(input))?;
    let mut format = [0u8; 3];
    format.copy_from_slice(fmt_bytes);
    Ok((
        rest,
        RespValue::VerbatimString {
            format,
            payload: Bytes::copy_from_slice(tail),
        },
    ))
}

fn decode_sequence(
    input: &[u8],
    depth: usize,
    max_depth: usize,
    wrap: impl Fn(Vec<RespValue>) -> RespValue,
) -> IResult<&[u8], RespValue> {
    let (mut rest, len) = read_signed_decimal(input)?;
    if len < 0 {
        return Ok((rest, RespValue::Null));
    }
    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        let (next_rest, value) = decode_value(rest, depth + 1, max_depth)?;
        items.push(value);
        rest = next_rest;
    }
    Ok((rest, wrap(items)))
}

fn decode_map(input: &[u8], depth: usize, max_depth: usize) -> IResult<&[u8], RespValue> {
    let (mut rest, pair_count) = read_signed_decimal(input)?;
    if pair_count < 0 {
        return Ok((rest, RespValue::Null));
    }
    let mut pairs = Vec::with_capacity(pair_count as usize);
    for _ in 0..pair_count {
        let (next_rest, key) = decode_value(rest, depth + 1, max_depth)?;
        let (next_rest, value) = decode_value(next_rest, depth + 1, max_depth)?;
        pairs.push((key, value));
        rest = next_rest;
    }
    Ok((rest, RespValue::Map(pairs)))
}

fn parse_double(text: &str) -> Option<f64> {
    match text {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => text.parse::<f64>().ok(),
    }
}
