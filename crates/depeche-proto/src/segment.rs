//! Segment framing (Section 3): `magic(u32) | version(u8) | length(u32 BE) |
//! last_flag(u8) | payload`.
//!
//! A logical message is the concatenation of the payloads of a consecutive
//! run of segments ending with the first one whose last-segment flag is
//! set. `send`/`read` are generic over `AsyncWrite`/`AsyncRead` so the same
//! code frames a `TcpStream` in production and a `tokio::io::duplex` pipe
//! in tests.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use depeche_types::DepecheError;

/// `0xDE0EC0E1`, chosen to read as "depeche" when squinted at in hex.
const MAGIC: u32 = 0xDE0E_C0E1;
const VERSION: u8 = 0;

/// Segments above this size are split further; well within the 2-64 KiB
/// band spec.md recommends.
const CHUNK_SIZE: usize = 16 * 1024;

const HEADER_LEN: usize = 4 + 1 + 4 + 1;

/// Emit `bytes` as one or more segments on `stream`. The final segment
/// carries the last-segment flag; an empty `bytes` still emits exactly one
/// (zero-length, last) segment.
pub async fn send<W: AsyncWrite + Unpin>(stream: &mut W, bytes: &[u8]) -> Result<(), DepecheError> {
    let mut chunks = bytes.chunks(CHUNK_SIZE).peekable();
    if chunks.peek().is_none() {
        return write_segment(stream, &[], true).await;
    }
    while let Some(chunk) = chunks.next() {
        let is_last = chunks.peek().is_none();
        write_segment(stream, chunk, is_last).await?;
    }
    Ok(())
}

async fn write_segment<W: AsyncWrite + Unpin>(
    stream: &mut W,
    payload: &[u8],
    is_last: bool,
) -> Result<(), DepecheError> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&MAGIC.to_be_bytes());
    header.push(VERSION);
    header.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    header.push(u8::from(is_last));
    stream.write_all(&header).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Read segments from `stream` until one with the last-segment flag is
/// seen, returning the concatenation of their payloads.
///
/// Fails with [`DepecheError::ProtocolMismatch`] if the magic doesn't
/// match, [`DepecheError::UnsupportedVersion`] if the version isn't `0`,
/// and [`DepecheError::Truncated`] if the peer closes mid-segment. A
/// stream that closes before delivering a single byte of the first
/// segment's header is not truncation — it's the liveness-probe case
/// spec.md §4.1 calls out — and yields an empty buffer instead.
pub async fn read<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, DepecheError> {
    let mut out = Vec::new();
    let mut is_first_segment = true;
    loop {
        match read_segment(stream, is_first_segment).await? {
            Some((payload, is_last)) => {
                out.extend_from_slice(&payload);
                if is_last {
                    return Ok(out);
                }
            }
            None => return Ok(out),
        }
        is_first_segment = false;
    }
}

/// Reads one segment. `is_first_segment` gates the liveness-probe
/// exception: only the very first header byte of the very first segment
/// of a `read` call may legitimately be absent (a freshly-accepted stream
/// with nothing written yet); once any byte of the header has arrived, or
/// once later segments are expected, closing early is `Truncated`.
async fn read_segment<R: AsyncRead + Unpin>(
    stream: &mut R,
    is_first_segment: bool,
) -> Result<Option<(Vec<u8>, bool)>, DepecheError> {
    let mut magic_buf = [0u8; 4];
    if is_first_segment {
        if !read_first_byte(stream, &mut magic_buf[..1]).await? {
            return Ok(None);
        }
        read_exact_or_truncated(stream, &mut magic_buf[1..]).await?;
    } else {
        read_exact_or_truncated(stream, &mut magic_buf).await?;
    }
    if u32::from_be_bytes(magic_buf) != MAGIC {
        return Err(DepecheError::ProtocolMismatch);
    }

    let mut version_buf = [0u8; 1];
    read_exact_or_truncated(stream, &mut version_buf).await?;
    if version_buf[0] != VERSION {
        return Err(DepecheError::UnsupportedVersion(version_buf[0]));
    }

    let mut len_buf = [0u8; 4];
    read_exact_or_truncated(stream, &mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut flag_buf = [0u8; 1];
    read_exact_or_truncated(stream, &mut flag_buf).await?;
    let is_last = flag_buf[0] != 0;

    let mut payload = vec![0u8; len];
    read_exact_or_truncated(stream, &mut payload).await?;

    Ok(Some((payload, is_last)))
}

/// Reads into `buf` (expected length 1), returning `false` if the stream
/// is already at EOF with nothing delivered at all, `true` once a byte has
/// landed in `buf`.
async fn read_first_byte<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut [u8]) -> Result<bool, DepecheError> {
    let n = stream.read(buf).await?;
    Ok(n > 0)
}

async fn read_exact_or_truncated<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut [u8],
) -> Result<(), DepecheError> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(DepecheError::Truncated),
        Err(e) => Err(DepecheError::Io(e)),
    }
}
