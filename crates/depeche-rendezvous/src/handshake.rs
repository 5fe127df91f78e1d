//! The single-connection handshake (Section 4.5): one side sends its
//! symmetrically-encrypted `RendezvousInfo` first (the dialer), the other
//! replies in kind. Any decryption or deserialization failure on either
//! side is reported as [`DepecheError::RendezvousAuth`] — the handshake
//! gives no more specific diagnosis than "this peer doesn't hold the
//! shared secret."

use tokio::io::{AsyncRead, AsyncWrite};

use depeche_crypto::{decrypt_symmetric, encrypt_symmetric};
use depeche_types::{DepecheError, RendezvousInfo};

async fn send_info<S: AsyncWrite + Unpin>(
    stream: &mut S,
    info: &RendezvousInfo,
    shared_secret: &str,
) -> Result<(), DepecheError> {
    let plaintext = info.to_json();
    let ciphertext = encrypt_symmetric(plaintext.as_bytes(), shared_secret);
    depeche_proto::send(stream, ciphertext.as_bytes()).await
}

async fn recv_info<S: AsyncRead + Unpin>(
    stream: &mut S,
    shared_secret: &str,
) -> Result<RendezvousInfo, DepecheError> {
    let ciphertext = depeche_proto::read(stream).await?;
    let ciphertext = std::str::from_utf8(&ciphertext).map_err(|_| DepecheError::RendezvousAuth)?;
    let plaintext = decrypt_symmetric(ciphertext, shared_secret).map_err(|_| DepecheError::RendezvousAuth)?;
    let plaintext = String::from_utf8(plaintext).map_err(|_| DepecheError::RendezvousAuth)?;
    RendezvousInfo::from_json(&plaintext).map_err(|_| DepecheError::RendezvousAuth)
}

/// Run the dialer side: send first, then read the reply.
pub async fn dial<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    own_info: &RendezvousInfo,
    shared_secret: &str,
) -> Result<RendezvousInfo, DepecheError> {
    send_info(stream, own_info, shared_secret).await?;
    recv_info(stream, shared_secret).await
}

/// Run the acceptor side: read first, then reply.
pub async fn accept<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    own_info: &RendezvousInfo,
    shared_secret: &str,
) -> Result<RendezvousInfo, DepecheError> {
    let peer_info = recv_info(stream, shared_secret).await?;
    send_info(stream, own_info, shared_secret).await?;
    Ok(peer_info)
}
