// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Authorization-session state and the cpHash/rpHash computations, per
//! Sections 16.7-16.8, "Trusted Platform Module Library Part 1:
//! Architecture", revision 1.38.
//!
//! A session is a mutable state machine: created from a StartAuthSession
//! exchange, advanced on every command that includes it (the caller nonce
//! rolls before each command, the TPM nonce rolls after each verified
//! response), and ended by FlushContext. Using a stale or flushed session
//! is a protocol error the TPM reports with an authorization failure, not
//! something detected locally.

use bitfield_struct::bitfield;
use hmac::Hmac;
use hmac::Mac;
use sha2::Digest;
use sha2::Sha256;
use sha2::Sha384;
use sha2::Sha512;
use thiserror::Error;
use tpm_protocol::AlgId;
use tpm_protocol::AlgIdEnum;
use tpm_protocol::CommandCode;
use tpm_protocol::TPM20_RS_PW;
use tpm_protocol::wire::TpmWriter;
use tpm_protocol::wire::size_2b;

/// `TPMA_SESSION` attribute bits carried in every auth entry.
#[bitfield(u8)]
pub struct TpmaSessionBits {
    pub continue_session: bool,
    pub audit_exclusive: bool,
    pub audit_reset: bool,
    #[bits(2)]
    _reserved: u8,
    pub decrypt: bool,
    pub encrypt: bool,
    pub audit: bool,
}

/// Errors raised while computing or checking session authorizations.
#[derive(Debug, Error)]
pub enum SessionAuthError {
    /// The session names a hash algorithm this engine cannot compute.
    #[error("session hash algorithm {0:#06x} is not supported")]
    UnsupportedHashAlgorithm(u16),
    /// The platform random source failed while rolling a nonce.
    #[error("failed to generate a session nonce")]
    NonceGeneration(#[source] getrandom::Error),
    /// An HMAC session was asked to authorize a command without a cpHash.
    #[error("no command parameter hash available for an HMAC session")]
    MissingCommandHash,
    /// The authorization HMAC returned by the TPM did not verify.
    #[error("response HMAC verification failed for session {session_handle:#010x}")]
    HmacMismatch {
        /// Handle of the failing session.
        session_handle: u32,
    },
}

/// One entry of a response authorization area, as split out by the
/// executor: `nonce 2B | attributes u8 | hmac 2B`.
#[derive(Debug, Clone, Copy)]
pub struct ReplyAuthEntry<'a> {
    /// The TPM's fresh nonce.
    pub nonce_tpm: &'a [u8],
    /// Echoed session attributes.
    pub attributes: u8,
    /// The TPM's authorization HMAC over rpHash.
    pub hmac: &'a [u8],
}

/// Mutable per-session authorization state.
///
/// Not internally synchronized: nonce and key state must advance in the
/// exact order commands are submitted, so callers hand the session to the
/// executor by exclusive reference and serialize access themselves.
#[derive(Debug, Clone)]
pub struct AuthSession {
    handle: u32,
    auth_hash: AlgId,
    attributes: TpmaSessionBits,
    nonce_caller: Vec<u8>,
    nonce_tpm: Vec<u8>,
    hmac_key: Vec<u8>,
}

impl AuthSession {
    /// The always-available password session: proves knowledge of the
    /// entity's auth value by sending it in the clear, with no hash
    /// algorithm, no nonces, and no HMAC.
    pub fn password(auth_value: &[u8]) -> Self {
        Self {
            handle: TPM20_RS_PW.0.get(),
            auth_hash: AlgIdEnum::NULL.into(),
            attributes: TpmaSessionBits::new().with_continue_session(true),
            nonce_caller: Vec::new(),
            nonce_tpm: Vec::new(),
            hmac_key: auth_value.to_vec(),
        }
    }

    /// An HMAC session, from the handle and nonce returned by a
    /// StartAuthSession exchange plus the derived key material
    /// (sessionKey ∥ authValue; empty for an unbound, unsalted session
    /// with an empty auth value).
    pub fn hmac(
        handle: u32,
        auth_hash: AlgId,
        nonce_tpm: Vec<u8>,
        hmac_key: Vec<u8>,
    ) -> Result<Self, SessionAuthError> {
        // Only the algorithms the keyed-hash path implements are valid
        // session hashes.
        if !matches!(
            AlgIdEnum::from_u16(auth_hash.0.get()),
            Some(AlgIdEnum::SHA256 | AlgIdEnum::SHA384 | AlgIdEnum::SHA512)
        ) {
            return Err(SessionAuthError::UnsupportedHashAlgorithm(
                auth_hash.0.get(),
            ));
        }

        Ok(Self {
            handle,
            auth_hash,
            attributes: TpmaSessionBits::new().with_continue_session(true),
            nonce_caller: Vec::new(),
            nonce_tpm,
            hmac_key,
        })
    }

    /// The session handle written into the auth area.
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// The hash algorithm configured on this session.
    pub fn auth_hash(&self) -> AlgId {
        self.auth_hash
    }

    /// Whether this session authorizes with an HMAC (and therefore needs
    /// the command/response parameter hashes computed).
    pub fn requires_hmac(&self) -> bool {
        !self.auth_hash.is_null()
    }

    /// Replace the session attribute bits.
    pub fn with_attributes(mut self, attributes: TpmaSessionBits) -> Self {
        self.attributes = attributes;
        self
    }

    /// Exact serialized size of this session's command auth entry:
    /// `handle u32 | nonce 2B | attributes u8 | hmac 2B`.
    pub fn command_auth_size(&self) -> usize {
        let (nonce_len, hmac_len) = if self.requires_hmac() {
            // Nonce length follows the hash algorithm; unwrap is safe by
            // the constructor check.
            let digest = self.auth_hash.digest_size().unwrap_or(0);
            (digest, digest)
        } else {
            (0, self.hmac_key.len())
        };
        size_of::<u32>() + size_2b(nonce_len) + size_of::<u8>() + size_2b(hmac_len)
    }

    /// Write this session's command auth entry.
    ///
    /// For an HMAC session this first rolls a fresh caller nonce (sized by
    /// the session's hash algorithm) and then authorizes with
    /// `HMAC(key, cpHash ∥ nonceCaller ∥ nonceTPM ∥ attributes)`. A
    /// password session writes an empty nonce and the raw auth value.
    pub(crate) fn write_command_auth(
        &mut self,
        writer: &mut TpmWriter<'_>,
        cp_hash: Option<&[u8]>,
    ) -> Result<(), SessionAuthError> {
        writer.write_u32(self.handle);

        if !self.requires_hmac() {
            writer.write_2b(&[]);
            writer.write_u8(self.attributes.into_bits());
            writer.write_2b(&self.hmac_key);
            return Ok(());
        }

        let cp_hash = cp_hash.ok_or(SessionAuthError::MissingCommandHash)?;

        // The caller nonce is fresh for every command.
        let digest_size = self
            .auth_hash
            .digest_size()
            .ok_or(SessionAuthError::UnsupportedHashAlgorithm(
                self.auth_hash.0.get(),
            ))?;
        let mut nonce = vec![0u8; digest_size];
        getrandom::fill(&mut nonce).map_err(SessionAuthError::NonceGeneration)?;
        self.nonce_caller = nonce;

        let auth = hmac_chunks(
            self.auth_hash,
            &self.hmac_key,
            &[
                cp_hash,
                &self.nonce_caller,
                &self.nonce_tpm,
                &[self.attributes.into_bits()],
            ],
        )?;

        writer.write_2b(&self.nonce_caller);
        writer.write_u8(self.attributes.into_bits());
        writer.write_2b(&auth);

        Ok(())
    }

    /// Verify the TPM's response auth entry against rpHash and, on
    /// success, roll the TPM nonce into the session state.
    ///
    /// The expected value is
    /// `HMAC(key, rpHash ∥ nonceTPM ∥ nonceCaller ∥ attributes)` with the
    /// freshly returned TPM nonce as nonceNewer. Comparison is constant
    /// time. A password session must come back with an empty HMAC.
    pub(crate) fn verify_response_auth(
        &mut self,
        entry: &ReplyAuthEntry<'_>,
        rp_hash: Option<&[u8]>,
    ) -> Result<(), SessionAuthError> {
        if !self.requires_hmac() {
            if !entry.hmac.is_empty() {
                return Err(SessionAuthError::HmacMismatch {
                    session_handle: self.handle,
                });
            }
            return Ok(());
        }

        let rp_hash = rp_hash.ok_or(SessionAuthError::MissingCommandHash)?;

        let expected = hmac_chunks(
            self.auth_hash,
            &self.hmac_key,
            &[
                rp_hash,
                entry.nonce_tpm,
                &self.nonce_caller,
                &[entry.attributes],
            ],
        )?;

        if !constant_time_eq::constant_time_eq(&expected, entry.hmac) {
            return Err(SessionAuthError::HmacMismatch {
                session_handle: self.handle,
            });
        }

        self.nonce_tpm = entry.nonce_tpm.to_vec();

        Ok(())
    }
}

/// cpHash: the digest authenticated by every command auth entry.
///
/// `H(commandCode ∥ handleArea ∥ parameterArea)` over the big-endian
/// command code, the serialized handle area, and the serialized parameter
/// area, using the hash algorithm of the first qualifying session.
pub fn cp_hash(
    alg: AlgId,
    command_code: CommandCode,
    handle_area: &[u8],
    parameters: &[u8],
) -> Result<Vec<u8>, SessionAuthError> {
    hash_chunks(
        alg,
        &[
            &command_code.0.get().to_be_bytes(),
            handle_area,
            parameters,
        ],
    )
}

/// rpHash: the digest the TPM authenticates in every response auth entry.
///
/// `H(responseCode ∥ commandCode ∥ responseParameters)`, both codes
/// big-endian.
pub fn rp_hash(
    alg: AlgId,
    response_code: u32,
    command_code: CommandCode,
    parameters: &[u8],
) -> Result<Vec<u8>, SessionAuthError> {
    hash_chunks(
        alg,
        &[
            &response_code.to_be_bytes(),
            &command_code.0.get().to_be_bytes(),
            parameters,
        ],
    )
}

fn hash_chunks(alg: AlgId, chunks: &[&[u8]]) -> Result<Vec<u8>, SessionAuthError> {
    macro_rules! do_hash {
        ($digest:ty) => {{
            let mut hasher = <$digest>::new();
            for chunk in chunks {
                hasher.update(chunk);
            }
            Ok(hasher.finalize().to_vec())
        }};
    }

    match AlgIdEnum::from_u16(alg.0.get()) {
        Some(AlgIdEnum::SHA256) => do_hash!(Sha256),
        Some(AlgIdEnum::SHA384) => do_hash!(Sha384),
        Some(AlgIdEnum::SHA512) => do_hash!(Sha512),
        _ => Err(SessionAuthError::UnsupportedHashAlgorithm(alg.0.get())),
    }
}

fn hmac_chunks(alg: AlgId, key: &[u8], chunks: &[&[u8]]) -> Result<Vec<u8>, SessionAuthError> {
    macro_rules! do_hmac {
        ($digest:ty) => {{
            // `new_from_slice` accepts any key length for HMAC.
            let mut mac = <Hmac<$digest> as Mac>::new_from_slice(key)
                .map_err(|_| SessionAuthError::UnsupportedHashAlgorithm(alg.0.get()))?;
            for chunk in chunks {
                mac.update(chunk);
            }
            Ok(mac.finalize().into_bytes().to_vec())
        }};
    }

    match AlgIdEnum::from_u16(alg.0.get()) {
        Some(AlgIdEnum::SHA256) => do_hmac!(Sha256),
        Some(AlgIdEnum::SHA384) => do_hmac!(Sha384),
        Some(AlgIdEnum::SHA512) => do_hmac!(Sha512),
        _ => Err(SessionAuthError::UnsupportedHashAlgorithm(alg.0.get())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpm_protocol::CommandCodeEnum;
    use tpm_protocol::wire::TpmReader;

    #[test]
    fn test_password_session_entry() {
        let mut session = AuthSession::password(b"owner");
        assert!(!session.requires_hmac());

        let mut buffer = vec![0u8; session.command_auth_size()];
        let mut writer = TpmWriter::new(&mut buffer);
        session.write_command_auth(&mut writer, None).unwrap();
        assert_eq!(writer.remaining(), 0);

        // handle | empty nonce | attributes | raw auth value
        let mut reader = TpmReader::new(&buffer);
        assert_eq!(reader.read_u32().unwrap(), 0x40000009);
        assert_eq!(reader.read_2b().unwrap(), &[] as &[u8]);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_2b().unwrap(), b"owner");
    }

    #[test]
    fn test_hmac_session_command_auth() {
        let nonce_tpm = vec![0x11u8; 32];
        let key = vec![0x22u8; 32];
        let mut session = AuthSession::hmac(
            0x02000001,
            AlgIdEnum::SHA256.into(),
            nonce_tpm.clone(),
            key.clone(),
        )
        .unwrap();
        assert!(session.requires_hmac());

        let cp = cp_hash(
            AlgIdEnum::SHA256.into(),
            CommandCodeEnum::GetRandom.into(),
            &[],
            &[0x00, 0x08],
        )
        .unwrap();

        let mut buffer = vec![0u8; session.command_auth_size()];
        let mut writer = TpmWriter::new(&mut buffer);
        session.write_command_auth(&mut writer, Some(&cp)).unwrap();
        assert_eq!(writer.remaining(), 0);

        let mut reader = TpmReader::new(&buffer);
        assert_eq!(reader.read_u32().unwrap(), 0x02000001);
        let nonce_caller = reader.read_2b().unwrap();
        assert_eq!(nonce_caller.len(), 32);
        let attributes = reader.read_u8().unwrap();
        let written_hmac = reader.read_2b().unwrap();

        // Recompute the HMAC from the wire entry and the shared state.
        let expected = hmac_chunks(
            AlgIdEnum::SHA256.into(),
            &key,
            &[&cp, nonce_caller, &nonce_tpm, &[attributes]],
        )
        .unwrap();
        assert_eq!(written_hmac, expected);
    }

    #[test]
    fn test_response_verify_rolls_nonce() {
        let key = vec![0x33u8; 16];
        let mut session = AuthSession::hmac(
            0x02000002,
            AlgIdEnum::SHA256.into(),
            vec![0x44u8; 32],
            key.clone(),
        )
        .unwrap();

        // Send one command to establish a caller nonce.
        let cp = vec![0xaa; 32];
        let mut buffer = vec![0u8; session.command_auth_size()];
        let mut writer = TpmWriter::new(&mut buffer);
        session.write_command_auth(&mut writer, Some(&cp)).unwrap();
        let nonce_caller = session.nonce_caller.clone();

        // Build the response entry the way the TPM would.
        let rp = rp_hash(
            AlgIdEnum::SHA256.into(),
            0,
            CommandCodeEnum::GetRandom.into(),
            &[0x00, 0x01, 0x5a],
        )
        .unwrap();
        let new_nonce_tpm = vec![0x55u8; 32];
        let attributes = TpmaSessionBits::new().with_continue_session(true);
        let tpm_hmac = hmac_chunks(
            AlgIdEnum::SHA256.into(),
            &key,
            &[&rp, &new_nonce_tpm, &nonce_caller, &[attributes.into_bits()]],
        )
        .unwrap();

        let entry = ReplyAuthEntry {
            nonce_tpm: &new_nonce_tpm,
            attributes: attributes.into_bits(),
            hmac: &tpm_hmac,
        };
        session.verify_response_auth(&entry, Some(&rp)).unwrap();
        assert_eq!(session.nonce_tpm, new_nonce_tpm);

        // Tampered HMAC must fail and leave the nonce unrolled.
        let mut bad = tpm_hmac.clone();
        bad[0] ^= 0x80;
        let entry = ReplyAuthEntry {
            nonce_tpm: &[0x66u8; 32],
            attributes: attributes.into_bits(),
            hmac: &bad,
        };
        assert!(matches!(
            session.verify_response_auth(&entry, Some(&rp)),
            Err(SessionAuthError::HmacMismatch { .. })
        ));
        assert_eq!(session.nonce_tpm, new_nonce_tpm);
    }

    #[test]
    fn test_password_session_rejects_response_hmac() {
        let mut session = AuthSession::password(&[]);
        let entry = ReplyAuthEntry {
            nonce_tpm: &[],
            attributes: 0x01,
            hmac: &[0xde, 0xad],
        };
        assert!(matches!(
            session.verify_response_auth(&entry, None),
            Err(SessionAuthError::HmacMismatch { .. })
        ));
    }

    #[test]
    fn test_unsupported_session_hash() {
        assert!(matches!(
            AuthSession::hmac(0x02000003, AlgIdEnum::NULL.into(), vec![], vec![]),
            Err(SessionAuthError::UnsupportedHashAlgorithm(_))
        ));
    }
}
