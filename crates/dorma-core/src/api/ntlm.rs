//! Minimal NTLM (NTLMSSP) message handling for the portal login.
//!
//! The portal only accepts NTLM authentication. The session client
//! keeps presenting Basic credentials; when the server answers 401
//! offering NTLM, it runs the Type 1 / Type 2 / Type 3 handshake
//! built from the functions here and repeats the request. The
//! authenticate message carries an NTLMv2 response (MD4 password
//! hash, HMAC-MD5 proof over server challenge and blob).

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;

type HmacMd5 = Hmac<Md5>;

/// Seconds between the Windows FILETIME epoch (1601) and the Unix
/// epoch.
const FILETIME_UNIX_OFFSET_SECS: u64 = 11_644_473_600;

/// Negotiation flags: Unicode and OEM strings, request target, NTLM,
/// always sign, extended session security.
const NEGOTIATE_FLAGS: u32 = 0x0008_8207;

/// Byte length of the fixed Type 3 header before the payload.
const AUTHENTICATE_HEADER_LEN: u32 = 64;

/// Server challenge plus the target info block that gets echoed back
/// inside the NTLMv2 blob.
pub struct Challenge {
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

/// Build the Type 1 (negotiate) message. Domain and workstation are
/// left empty; the server does not need them to issue a challenge.
pub fn negotiate_message() -> Vec<u8> {
    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(b"NTLMSSP\0");
    msg.extend_from_slice(&1u32.to_le_bytes());
    msg.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
    msg.extend_from_slice(&security_buffer(0, 32)); // domain
    msg.extend_from_slice(&security_buffer(0, 32)); // workstation
    msg
}

/// Parse the Type 2 (challenge) message from the decoded
/// `WWW-Authenticate: NTLM <base64>` payload.
pub fn parse_challenge(data: &[u8]) -> Result<Challenge> {
    if data.len() < 48 {
        return Err(anyhow!("NTLM challenge too short: {} bytes", data.len()));
    }
    if &data[..8] != b"NTLMSSP\0" {
        return Err(anyhow!("NTLM challenge has no NTLMSSP signature"));
    }
    let message_type = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    if message_type != 2 {
        return Err(anyhow!(
            "expected NTLM message type 2, got {}",
            message_type
        ));
    }

    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(&data[24..32]);

    let info_len = u16::from_le_bytes([data[40], data[41]]) as usize;
    let info_offset =
        u32::from_le_bytes([data[44], data[45], data[46], data[47]]) as usize;
    if info_offset + info_len > data.len() {
        return Err(anyhow!("NTLM challenge target info out of bounds"));
    }

    Ok(Challenge {
        server_challenge,
        target_info: data[info_offset..info_offset + info_len].to_vec(),
    })
}

/// Build the Type 3 (authenticate) message answering a challenge.
/// Accounts may use `DOMAIN\user` syntax; without a domain part the
/// domain fields stay empty.
pub fn authenticate_message(challenge: &Challenge, account: &str, pass: &str) -> Vec<u8> {
    let client_challenge: [u8; 8] = rand::random();
    authenticate_message_with(challenge, account, pass, client_challenge, filetime_now())
}

fn authenticate_message_with(
    challenge: &Challenge,
    account: &str,
    pass: &str,
    client_challenge: [u8; 8],
    timestamp: u64,
) -> Vec<u8> {
    let (domain, user) = split_account(account);
    let key = ntlmv2_hash(user, domain, pass);

    // NTLMv2 blob: version, timestamp, client challenge, target info
    let mut blob = Vec::with_capacity(28 + challenge.target_info.len() + 4);
    blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(&client_challenge);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&challenge.target_info);
    blob.extend_from_slice(&[0u8; 4]);

    let mut proof_input = Vec::with_capacity(8 + blob.len());
    proof_input.extend_from_slice(&challenge.server_challenge);
    proof_input.extend_from_slice(&blob);
    let nt_proof = hmac_md5(&key, &proof_input);

    let mut nt_response = Vec::with_capacity(16 + blob.len());
    nt_response.extend_from_slice(&nt_proof);
    nt_response.extend_from_slice(&blob);

    let domain_bytes = utf16le(domain);
    let user_bytes = utf16le(user);

    // Payload order: domain, user, workstation (empty), LM response
    // (empty), NT response
    let domain_offset = AUTHENTICATE_HEADER_LEN;
    let user_offset = domain_offset + domain_bytes.len() as u32;
    let workstation_offset = user_offset + user_bytes.len() as u32;
    let nt_offset = workstation_offset;
    let session_key_offset = nt_offset + nt_response.len() as u32;

    let mut msg = Vec::with_capacity(
        AUTHENTICATE_HEADER_LEN as usize
            + domain_bytes.len()
            + user_bytes.len()
            + nt_response.len(),
    );
    msg.extend_from_slice(b"NTLMSSP\0");
    msg.extend_from_slice(&3u32.to_le_bytes());
    msg.extend_from_slice(&security_buffer(0, workstation_offset)); // LM response
    msg.extend_from_slice(&security_buffer(nt_response.len() as u16, nt_offset));
    msg.extend_from_slice(&security_buffer(domain_bytes.len() as u16, domain_offset));
    msg.extend_from_slice(&security_buffer(user_bytes.len() as u16, user_offset));
    msg.extend_from_slice(&security_buffer(0, workstation_offset));
    msg.extend_from_slice(&security_buffer(0, session_key_offset));
    msg.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
    msg.extend_from_slice(&domain_bytes);
    msg.extend_from_slice(&user_bytes);
    msg.extend_from_slice(&nt_response);
    msg
}

/// NTOWFv2: HMAC-MD5 of the uppercased user + domain, keyed with the
/// MD4 hash of the UTF-16LE password.
fn ntlmv2_hash(user: &str, domain: &str, pass: &str) -> [u8; 16] {
    let mut md4 = Md4::new();
    md4.update(utf16le(pass));
    let nt_hash = md4.finalize();

    let mut target = user.to_uppercase();
    target.push_str(domain);
    hmac_md5(&nt_hash, &utf16le(&target))
}

fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    let mut mac = HmacMd5::new_from_slice(key).expect("HMAC-MD5 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Split `DOMAIN\user` into (domain, user); plain accounts have an
/// empty domain.
fn split_account(account: &str) -> (&str, &str) {
    account.split_once('\\').unwrap_or(("", account))
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Security buffer: length, allocated length, payload offset.
fn security_buffer(len: u16, offset: u32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0..2].copy_from_slice(&len.to_le_bytes());
    buf[2..4].copy_from_slice(&len.to_le_bytes());
    buf[4..8].copy_from_slice(&offset.to_le_bytes());
    buf
}

/// Current time as a Windows FILETIME (100ns ticks since 1601).
fn filetime_now() -> u64 {
    (chrono::Utc::now().timestamp() as u64 + FILETIME_UNIX_OFFSET_SECS) * 10_000_000
}
