// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Host-side TPM 2.0 command execution engine.
//!
//! The executor turns a command input plus zero or more authorization
//! sessions into a typed result: it builds the spec-exact request
//! envelope, computes the command-parameter hash and authorization area
//! when sessions require it, submits the buffer across an opaque
//! transport, parses and validates the response envelope, verifies each
//! session's response HMAC, and hands the parameter bytes to the codec
//! registered for the command code.
//!
//! Execution is synchronous and single-threaded per call: a TPM endpoint
//! processes one command at a time, so [`TpmExecutor::execute`] is a
//! blocking round trip with no internal parallelism, no retries, and no
//! cancellation. A transport failure is terminal for the device instance;
//! the resource manager behind it is assumed to have discarded this
//! client's state, so the device and all sessions and transient handles
//! must be rebuilt from scratch.

pub mod commands;
pub mod registry;
pub mod session;

pub use commands::ResponseBody;
pub use commands::TpmCommand;
pub use registry::ResponseCodec;
pub use registry::ResponseRegistry;
pub use session::AuthSession;
pub use session::SessionAuthError;
pub use session::TpmaSessionBits;

use session::ReplyAuthEntry;
use thiserror::Error;
use tpm_protocol::ResponseValidationError;
use tpm_protocol::SessionTag;
use tpm_protocol::SessionTagEnum;
use tpm_protocol::headers::CmdHeader;
use tpm_protocol::headers::ReplyHeader;
use tpm_protocol::rc::TPM_RC_SIZE;
use tpm_protocol::rc::TpmRc;
use tpm_protocol::wire::TpmReader;
use tpm_protocol::wire::TpmWriter;
use tpm_protocol::wire::WireError;
use zerocopy::IntoBytes;

// The size of command and response buffers.
// DEVNOTE: The specification only requires the size to be large
// enough for the command and response to fit into the buffer.
pub(crate) const TPM_PAGE_SIZE: usize = 4096;

/// The transport collaborator boundary: submit these exact bytes, write
/// the device's response into `response`, and return how many bytes it
/// produced, or fail with a platform-specific error code.
///
/// This one operation is the entire contract the engine requires from the
/// device layer. Timeout policy, if any, belongs behind this trait.
pub trait TpmTransport {
    /// Perform one blocking command/response exchange.
    fn submit(&mut self, command: &[u8], response: &mut [u8]) -> Result<usize, TransportError>;
}

/// A transport-level failure, carrying the platform's opaque error code.
///
/// Terminal for the owning device: the underlying resource manager is
/// assumed to have discarded this client's state, so the device must be
/// recreated and sessions re-established.
#[derive(Debug, Error)]
#[error("tpm transport failure, platform error code {code:#010x}")]
pub struct TransportError {
    /// The platform-specific error code.
    pub code: u32,
}

/// The three-way outcome taxonomy of a command exchange, plus the
/// request-level failures detected before any bytes move.
#[derive(Debug, Error)]
pub enum TpmCommandError {
    /// The command code has no registered response codec; detected before
    /// submission.
    #[error("command code {0:#010x} has no registered response codec")]
    UnsupportedCommandCode(u32),
    /// The transport failed to complete the exchange.
    #[error("failed to submit the command to the tpm device")]
    Transport(#[source] TransportError),
    /// The response bytes violate the envelope framing rules.
    #[error("invalid response from the tpm")]
    InvalidResponse(#[source] ResponseValidationError),
    /// The response parameter area does not decode as the registered
    /// shape.
    #[error("malformed response parameters from the tpm")]
    InvalidResponseParameters(#[source] WireError),
    /// The TPM reported an error; never retried automatically. Retry
    /// policy for warning-class codes is a caller decision.
    #[error("tpm command failed, response code {response_code}")]
    TpmCommandFailed {
        /// The decomposable response code.
        response_code: TpmRc,
    },
    /// A session's response HMAC failed to verify (or could not be
    /// computed). Reported even when the TPM claimed overall success.
    #[error("session authorization failed")]
    AuthorizationFailed(#[source] SessionAuthError),
}

/// A successful exchange: the response's output handles and typed body.
///
/// Borrows the executor's reply buffer; drop it before the next
/// `execute`.
#[derive(Debug)]
pub struct TpmReply<'a> {
    /// Output handles, count fixed per command.
    pub handles: Vec<u32>,
    /// The typed response payload.
    pub body: ResponseBody<'a>,
}

/// The command execution engine.
///
/// Owns the transport, the response codec registry, and the reply buffer
/// that successful results borrow from.
pub struct TpmExecutor<T> {
    transport: T,
    registry: ResponseRegistry,
    reply_buffer: Box<[u8]>,
}

impl<T: TpmTransport> TpmExecutor<T> {
    /// An executor over `transport` with the built-in command set
    /// registered.
    pub fn new(transport: T) -> Self {
        Self::with_registry(transport, ResponseRegistry::builtin())
    }

    /// An executor with an explicit registry, for callers that extend or
    /// restrict the command set.
    pub fn with_registry(transport: T, registry: ResponseRegistry) -> Self {
        Self {
            transport,
            registry,
            reply_buffer: vec![0u8; TPM_PAGE_SIZE].into_boxed_slice(),
        }
    }

    /// Execute one command as a strict, single-pass state machine; every
    /// step either advances or returns a terminal result.
    ///
    /// `sessions` are advanced in declared order (nonce rotation and key
    /// verification), so the same order must be used when the TPM built
    /// the response.
    ///
    /// # Panics
    ///
    /// Panics if the command input's declared serialized size disagrees
    /// with the bytes its write operations produce. That mismatch is a
    /// bug in the command codec, not a runtime condition, and must fail
    /// loudly rather than be coerced.
    pub fn execute<'a>(
        &'a mut self,
        command: &dyn TpmCommand,
        sessions: &mut [AuthSession],
    ) -> Result<TpmReply<'a>, TpmCommandError> {
        let code = command.command_code();

        // Fail fast on an unregistered command; no bytes are sent.
        let codec = self
            .registry
            .lookup(code)
            .ok_or(TpmCommandError::UnsupportedCommandCode(code.0.get()))?;

        let has_sessions = !sessions.is_empty();
        let session_tag: SessionTag = if has_sessions {
            SessionTagEnum::Sessions
        } else {
            SessionTagEnum::NoSessions
        }
        .into();

        // Serialize handles then parameters into scratch space sized
        // exactly from the declared size.
        let declared = command.serialized_size();
        let mut scratch = vec![0u8; declared];
        let handle_area_len = {
            let mut writer = TpmWriter::new(&mut scratch);
            command.write_handles(&mut writer);
            let handle_area_len = writer.offset();
            command.write_parameters(&mut writer);
            assert_eq!(
                writer.offset(),
                declared,
                "command {:#010x} declared {declared} serialized bytes but wrote {}",
                code.0.get(),
                writer.offset(),
            );
            handle_area_len
        };
        let (handle_area, parameter_area) = scratch.split_at(handle_area_len);

        // cpHash is needed only when a session authorizes with an HMAC;
        // password-only exchanges skip the digest entirely.
        let cp_hash = match sessions.iter().find(|s| s.requires_hmac()) {
            Some(session) => Some(
                session::cp_hash(session.auth_hash(), code, handle_area, parameter_area)
                    .map_err(TpmCommandError::AuthorizationFailed)?,
            ),
            None => None,
        };

        let auth_area_len = if has_sessions {
            size_of::<u32>()
                + sessions
                    .iter()
                    .map(|s| s.command_auth_size())
                    .sum::<usize>()
        } else {
            0
        };

        // One exactly-sized request buffer:
        // header | handles | [authSize | authEntry*] | parameters.
        let total = size_of::<CmdHeader>() + declared + auth_area_len;
        let mut request = vec![0u8; total];
        {
            let mut writer = TpmWriter::new(&mut request);
            writer.write_bytes(CmdHeader::new(session_tag, total as u32, code).as_bytes());
            writer.write_bytes(handle_area);
            if has_sessions {
                writer.write_u32((auth_area_len - size_of::<u32>()) as u32);
                for session in sessions.iter_mut() {
                    session
                        .write_command_auth(&mut writer, cp_hash.as_deref())
                        .map_err(TpmCommandError::AuthorizationFailed)?;
                }
            }
            writer.write_bytes(parameter_area);
            assert_eq!(writer.remaining(), 0, "request length computed incorrectly");
        }

        tracing::debug!(
            command_code = code.0.get(),
            request_len = total,
            sessions = sessions.len(),
            "submitting tpm command"
        );

        let received_len = self
            .transport
            .submit(&request, &mut self.reply_buffer)
            .map_err(|error| {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "tpm transport failure"
                );
                TpmCommandError::Transport(error)
            })?;
        assert!(
            received_len <= self.reply_buffer.len(),
            "transport reported more bytes than the response buffer holds"
        );
        let received = &self.reply_buffer[..received_len];

        // Envelope validation. A declared size that disagrees with the
        // received byte count is reported as TPM_RC_SIZE without
        // attempting parameter parsing.
        let header = ReplyHeader::validate(received, session_tag, TPM_PAGE_SIZE).map_err(
            |error| match error {
                ResponseValidationError::HeaderResponseSizeMismatch { .. } => {
                    TpmCommandError::TpmCommandFailed {
                        response_code: TPM_RC_SIZE,
                    }
                }
                other => TpmCommandError::InvalidResponse(other),
            },
        )?;

        let response_code = TpmRc(header.response_code.get());
        if !response_code.is_success() {
            tracing::warn!(
                command_code = code.0.get(),
                %response_code,
                "tpm command failed"
            );
            return Err(TpmCommandError::TpmCommandFailed { response_code });
        }

        // Output handles, then the parameter/auth split. The
        // parameter-size field exists only when sessions are present.
        let mut reader = TpmReader::new(&received[size_of::<ReplyHeader>()..]);
        let mut handles = Vec::with_capacity(codec.out_handles);
        for _ in 0..codec.out_handles {
            handles.push(
                reader
                    .read_u32()
                    .map_err(TpmCommandError::InvalidResponseParameters)?,
            );
        }

        let (parameter_bytes, auth_bytes) = if has_sessions {
            let parameter_size = reader
                .read_u32()
                .map_err(TpmCommandError::InvalidResponseParameters)?
                as usize;
            let parameters = reader
                .read_bytes(parameter_size)
                .map_err(TpmCommandError::InvalidResponseParameters)?;
            let auth_len = reader.remaining();
            let auth = reader
                .read_bytes(auth_len)
                .map_err(TpmCommandError::InvalidResponseParameters)?;
            (parameters, auth)
        } else {
            let parameter_len = reader.remaining();
            let parameters = reader
                .read_bytes(parameter_len)
                .map_err(TpmCommandError::InvalidResponseParameters)?;
            (parameters, &[][..])
        };

        // Decode the parameter area with the registered codec; trailing
        // bytes mean the response does not have the registered shape.
        let mut parameter_reader = TpmReader::new(parameter_bytes);
        let body = (codec.parse)(&mut parameter_reader, &handles)
            .map_err(TpmCommandError::InvalidResponseParameters)?;
        if parameter_reader.remaining() != 0 {
            return Err(TpmCommandError::TpmCommandFailed {
                response_code: TPM_RC_SIZE,
            });
        }

        // Verify and roll each session in declared order. Any failure
        // aborts the exchange even though the TPM reported success.
        if has_sessions {
            let rp_hash = match sessions.iter().find(|s| s.requires_hmac()) {
                Some(session) => Some(
                    session::rp_hash(
                        session.auth_hash(),
                        response_code.value(),
                        code,
                        parameter_bytes,
                    )
                    .map_err(TpmCommandError::AuthorizationFailed)?,
                ),
                None => None,
            };

            let mut auth_reader = TpmReader::new(auth_bytes);
            for session in sessions.iter_mut() {
                let nonce_tpm = auth_reader
                    .read_2b()
                    .map_err(TpmCommandError::InvalidResponseParameters)?;
                let attributes = auth_reader
                    .read_u8()
                    .map_err(TpmCommandError::InvalidResponseParameters)?;
                let hmac = auth_reader
                    .read_2b()
                    .map_err(TpmCommandError::InvalidResponseParameters)?;

                session
                    .verify_response_auth(
                        &ReplyAuthEntry {
                            nonce_tpm,
                            attributes,
                            hmac,
                        },
                        rp_hash.as_deref(),
                    )
                    .map_err(TpmCommandError::AuthorizationFailed)?;
            }
            if auth_reader.remaining() != 0 {
                return Err(TpmCommandError::TpmCommandFailed {
                    response_code: TPM_RC_SIZE,
                });
            }
        }

        tracing::debug!(
            command_code = code.0.get(),
            response_len = received_len,
            "tpm command succeeded"
        );

        Ok(TpmReply { handles, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::FlushContextCmd;
    use crate::commands::GetCapabilityCmd;
    use crate::commands::GetRandomCmd;
    use crate::commands::NvWriteCmd;
    use crate::commands::StartAuthSessionCmd;
    use hmac::Hmac;
    use hmac::Mac;
    use sha2::Sha256;
    use std::collections::VecDeque;
    use tpm_protocol::AlgIdEnum;
    use tpm_protocol::CommandCode;
    use tpm_protocol::SessionType;
    use tpm_protocol::capability::Capability;
    use tpm_protocol::capability::CapabilityData;

    /// Canned-response transport: records every request and replays a
    /// queue of prepared responses.
    struct EchoTransport {
        responses: VecDeque<Vec<u8>>,
        requests: Vec<Vec<u8>>,
    }

    impl EchoTransport {
        fn new(responses: impl IntoIterator<Item = Vec<u8>>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                requests: Vec::new(),
            }
        }
    }

    impl TpmTransport for EchoTransport {
        fn submit(&mut self, command: &[u8], response: &mut [u8]) -> Result<usize, TransportError> {
            self.requests.push(command.to_vec());
            let reply = self.responses.pop_front().expect("unexpected submit");
            response[..reply.len()].copy_from_slice(&reply);
            Ok(reply.len())
        }
    }

    struct FailingTransport {
        code: u32,
    }

    impl TpmTransport for FailingTransport {
        fn submit(
            &mut self,
            _command: &[u8],
            _response: &mut [u8],
        ) -> Result<usize, TransportError> {
            Err(TransportError { code: self.code })
        }
    }

    fn reply_header(tag: u16, size: u32, rc: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&tag.to_be_bytes());
        bytes.extend_from_slice(&size.to_be_bytes());
        bytes.extend_from_slice(&rc.to_be_bytes());
        bytes
    }

    fn hmac_sha256(key: &[u8], chunks: &[&[u8]]) -> Vec<u8> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).unwrap();
        for chunk in chunks {
            mac.update(chunk);
        }
        mac.finalize().into_bytes().to_vec()
    }

    #[test]
    fn test_get_random_no_sessions() {
        const RANDOM: [u8; 8] = [0xa5, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xa5];

        let mut reply = reply_header(0x8001, 20, 0);
        reply.extend_from_slice(&[0x00, 0x08]);
        reply.extend_from_slice(&RANDOM);

        let mut executor = TpmExecutor::new(EchoTransport::new([reply]));
        let result = executor
            .execute(
                &GetRandomCmd {
                    bytes_requested: 8,
                },
                &mut [],
            )
            .unwrap();

        assert!(result.handles.is_empty());
        let ResponseBody::GetRandom { random } = result.body else {
            panic!("wrong body variant");
        };
        assert_eq!(random.len(), 8);
        assert_eq!(random, RANDOM);

        // The request on the wire: NoSessions framing, exact size, code,
        // and the 16-bit count parameter.
        const EXPECTED_CMD: [u8; 12] = [
            0x80, 0x01, // TPM_ST_NO_SESSIONS
            0x00, 0x00, 0x00, 0x0c, // size = 12
            0x00, 0x00, 0x01, 0x7b, // TPM_CC_GetRandom
            0x00, 0x08, // bytesRequested
        ];
        assert_eq!(executor.transport.requests, vec![EXPECTED_CMD.to_vec()]);
    }

    #[test]
    fn test_unsupported_command_sends_nothing() {
        let mut executor =
            TpmExecutor::with_registry(EchoTransport::new([]), ResponseRegistry::new());
        let result = executor.execute(
            &GetRandomCmd {
                bytes_requested: 8,
            },
            &mut [],
        );
        assert!(matches!(
            result,
            Err(TpmCommandError::UnsupportedCommandCode(0x17b))
        ));
        assert!(executor.transport.requests.is_empty());
    }

    #[test]
    fn test_transport_error_short_circuits() {
        let mut executor = TpmExecutor::new(FailingTransport { code: 0x8028_0400 });
        let result = executor.execute(
            &GetRandomCmd {
                bytes_requested: 8,
            },
            &mut [],
        );
        match result {
            Err(TpmCommandError::Transport(TransportError { code })) => {
                assert_eq!(code, 0x8028_0400);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_tpm_error_short_circuits() {
        // TPM_RC_HANDLE associated with handle 1.
        let reply = reply_header(0x8001, 10, 0x18b);
        let mut executor = TpmExecutor::new(EchoTransport::new([reply]));
        let result = executor.execute(&FlushContextCmd { flush_handle: 0 }, &mut []);
        match result {
            Err(TpmCommandError::TpmCommandFailed { response_code }) => {
                assert_eq!(response_code.value(), 0x18b);
                assert_eq!(response_code.handle_number(), Some(1));
                assert!(!response_code.is_warning());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_size_mismatch_yields_rc_size() {
        // Header claims 21 bytes; 20 arrive.
        let mut reply = reply_header(0x8001, 21, 0);
        reply.extend_from_slice(&[0x00, 0x08]);
        reply.extend_from_slice(&[0u8; 8]);

        let mut executor = TpmExecutor::new(EchoTransport::new([reply]));
        let result = executor.execute(
            &GetRandomCmd {
                bytes_requested: 8,
            },
            &mut [],
        );
        assert!(matches!(
            result,
            Err(TpmCommandError::TpmCommandFailed {
                response_code: TPM_RC_SIZE,
            })
        ));
    }

    #[test]
    fn test_trailing_bytes_yield_rc_size() {
        // Self-consistent envelope with one byte beyond the registered
        // response shape.
        let mut reply = reply_header(0x8001, 21, 0);
        reply.extend_from_slice(&[0x00, 0x08]);
        reply.extend_from_slice(&[0u8; 8]);
        reply.push(0xff);

        let mut executor = TpmExecutor::new(EchoTransport::new([reply]));
        let result = executor.execute(
            &GetRandomCmd {
                bytes_requested: 8,
            },
            &mut [],
        );
        assert!(matches!(
            result,
            Err(TpmCommandError::TpmCommandFailed {
                response_code: TPM_RC_SIZE,
            })
        ));
    }

    #[test]
    fn test_get_capability_properties() {
        #[rustfmt::skip]
        let parameters = [
            0x01, // moreData = YES
            0x00, 0x00, 0x00, 0x06, // TPM_CAP_TPM_PROPERTIES
            0x00, 0x00, 0x00, 0x03, // count = 3
            0x00, 0x00, 0x01, 0x00, 0x32, 0x2e, 0x30, 0x00,
            0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x74,
            0x00, 0x00, 0x01, 0x05, 0x49, 0x42, 0x4d, 0x20,
        ];
        let mut reply = reply_header(0x8001, 10 + parameters.len() as u32, 0);
        reply.extend_from_slice(&parameters);

        let mut executor = TpmExecutor::new(EchoTransport::new([reply]));
        let result = executor
            .execute(
                &GetCapabilityCmd {
                    capability: Capability::TpmProperties,
                    property: 0x100,
                    property_count: 3,
                },
                &mut [],
            )
            .unwrap();

        let ResponseBody::GetCapability { more_data, data } = result.body else {
            panic!("wrong body variant");
        };
        assert!(more_data);
        let CapabilityData::TpmProperties(entries) = data else {
            panic!("wrong capability variant");
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].property, 0x100);
        assert_eq!(entries[2].value, 0x49424d20);
    }

    #[test]
    fn test_start_auth_session_returns_handle() {
        let mut parameters = vec![0x00, 0x20];
        parameters.extend_from_slice(&[0x77; 32]);

        let mut reply = reply_header(0x8001, 10 + 4 + parameters.len() as u32, 0);
        reply.extend_from_slice(&0x0200_0001u32.to_be_bytes());
        reply.extend_from_slice(&parameters);

        let mut executor = TpmExecutor::new(EchoTransport::new([reply]));
        let cmd = StartAuthSessionCmd::unbound_unsalted(
            SessionType::Hmac,
            AlgIdEnum::SHA256.into(),
            &[0x12; 16],
        )
        .unwrap();
        let result = executor.execute(&cmd, &mut []).unwrap();

        assert_eq!(result.handles, vec![0x0200_0001]);
        let ResponseBody::StartAuthSession { nonce_tpm } = result.body else {
            panic!("wrong body variant");
        };
        assert_eq!(nonce_tpm, [0x77; 32]);

        // The session object picks up where the exchange left off.
        let session = AuthSession::hmac(
            result.handles[0],
            AlgIdEnum::SHA256.into(),
            nonce_tpm.to_vec(),
            Vec::new(),
        )
        .unwrap();
        assert!(session.requires_hmac());
    }

    #[test]
    fn test_password_session_round_trip() {
        // Response: sessions framing, zero-length parameter area, one
        // password auth entry (empty nonce, empty hmac).
        let mut reply = reply_header(0x8002, 10 + 4 + 5, 0);
        reply.extend_from_slice(&0u32.to_be_bytes());
        reply.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00]);

        let mut executor = TpmExecutor::new(EchoTransport::new([reply]));
        let cmd = NvWriteCmd::new(0x01c1_0100, 0x01c1_0100, &[0xaa, 0xbb], 0).unwrap();
        let mut sessions = [AuthSession::password(b"owner")];
        let result = executor.execute(&cmd, &mut sessions).unwrap();
        assert!(matches!(result.body, ResponseBody::Unit));

        // The request carries the Sessions tag and the password auth
        // entry between handles and parameters.
        let request = &executor.transport.requests[0];
        assert_eq!(request[..2], [0x80, 0x02]);
        // header(10) + handles(8) + authSize(4) + entry(4+2+1+2+5) + data 2B(4) + offset(2)
        assert_eq!(request.len(), 10 + 8 + 4 + 14 + 4 + 2);
        let mut reader = TpmReader::new(&request[18..]);
        assert_eq!(reader.read_u32().unwrap(), 14); // authorizationSize
        assert_eq!(reader.read_u32().unwrap(), 0x4000_0009); // TPM_RS_PW
        assert_eq!(reader.read_2b().unwrap(), &[] as &[u8]); // empty nonce
        assert_eq!(reader.read_u8().unwrap(), 0x01); // continueSession
        assert_eq!(reader.read_2b().unwrap(), b"owner"); // raw auth value
    }

    /// A transport that implements the TPM side of an HMAC session for
    /// GetRandom: it checks the command HMAC against the shared key and
    /// produces a properly authenticated response with a fresh nonce.
    struct HmacTpmTransport {
        key: Vec<u8>,
        nonce_tpm: Vec<u8>,
        calls: u8,
        corrupt_response_hmac: bool,
    }

    impl TpmTransport for HmacTpmTransport {
        fn submit(&mut self, command: &[u8], response: &mut [u8]) -> Result<usize, TransportError> {
            self.calls += 1;

            let mut reader = TpmReader::new(command);
            assert_eq!(reader.read_u16().unwrap(), 0x8002);
            let declared = reader.read_u32().unwrap();
            assert_eq!(declared as usize, command.len());
            let command_code = reader.read_u32().unwrap();

            // GetRandom has no handles; the auth area follows the header.
            let auth_size = reader.read_u32().unwrap();
            let auth_start = reader.consumed();
            let session_handle = reader.read_u32().unwrap();
            assert_eq!(session_handle, 0x0200_0001);
            let nonce_caller = reader.read_2b().unwrap().to_vec();
            let attributes = reader.read_u8().unwrap();
            let command_hmac = reader.read_2b().unwrap().to_vec();
            assert_eq!(reader.consumed() - auth_start, auth_size as usize);
            let remaining = reader.remaining();
            let parameters = reader.read_bytes(remaining).unwrap();

            // Verify cpHash-based authorization the way the TPM would.
            let cp = session::cp_hash(
                AlgIdEnum::SHA256.into(),
                CommandCode(command_code.into()),
                &[],
                parameters,
            )
            .unwrap();
            let expected = hmac_sha256(
                &self.key,
                &[&cp, &nonce_caller, &self.nonce_tpm, &[attributes]],
            );
            assert_eq!(command_hmac, expected, "command HMAC mismatch");

            // Build the authenticated response.
            let random = [0x5a; 8];
            let mut response_parameters = vec![0x00, 0x08];
            response_parameters.extend_from_slice(&random);

            let new_nonce_tpm = vec![0x60 + self.calls; 32];
            let rp = session::rp_hash(
                AlgIdEnum::SHA256.into(),
                0,
                CommandCode(command_code.into()),
                &response_parameters,
            )
            .unwrap();
            let mut response_hmac = hmac_sha256(
                &self.key,
                &[&rp, &new_nonce_tpm, &nonce_caller, &[attributes]],
            );
            if self.corrupt_response_hmac {
                response_hmac[0] ^= 0xff;
            }
            self.nonce_tpm = new_nonce_tpm.clone();

            let auth_area_len = 2 + 32 + 1 + 2 + 32;
            let total = 10 + 4 + response_parameters.len() + auth_area_len;
            let mut reply = reply_header(0x8002, total as u32, 0);
            reply.extend_from_slice(&(response_parameters.len() as u32).to_be_bytes());
            reply.extend_from_slice(&response_parameters);
            reply.extend_from_slice(&(32u16).to_be_bytes());
            reply.extend_from_slice(&new_nonce_tpm);
            reply.push(attributes);
            reply.extend_from_slice(&(32u16).to_be_bytes());
            reply.extend_from_slice(&response_hmac);

            response[..reply.len()].copy_from_slice(&reply);
            Ok(reply.len())
        }
    }

    #[test]
    fn test_hmac_session_verifies_and_rolls() {
        let key = vec![0x42u8; 32];
        let initial_nonce_tpm = vec![0x11u8; 32];

        let mut executor = TpmExecutor::new(HmacTpmTransport {
            key: key.clone(),
            nonce_tpm: initial_nonce_tpm.clone(),
            calls: 0,
            corrupt_response_hmac: false,
        });

        let mut sessions = [AuthSession::hmac(
            0x0200_0001,
            AlgIdEnum::SHA256.into(),
            initial_nonce_tpm,
            key,
        )
        .unwrap()];

        // Two consecutive exchanges: the second only verifies on both
        // sides if the nonce pair rolled correctly after the first.
        for _ in 0..2 {
            let result = executor
                .execute(
                    &GetRandomCmd {
                        bytes_requested: 8,
                    },
                    &mut sessions,
                )
                .unwrap();
            let ResponseBody::GetRandom { random } = result.body else {
                panic!("wrong body variant");
            };
            assert_eq!(random, [0x5a; 8]);
        }
        assert_eq!(executor.transport.calls, 2);
    }

    #[test]
    fn test_failed_response_hmac_aborts() {
        let key = vec![0x42u8; 32];
        let initial_nonce_tpm = vec![0x11u8; 32];

        let mut executor = TpmExecutor::new(HmacTpmTransport {
            key: key.clone(),
            nonce_tpm: initial_nonce_tpm.clone(),
            calls: 0,
            corrupt_response_hmac: true,
        });

        let mut sessions = [AuthSession::hmac(
            0x0200_0001,
            AlgIdEnum::SHA256.into(),
            initial_nonce_tpm,
            key,
        )
        .unwrap()];

        // The TPM reports success, but the authorization must still fail.
        let result = executor.execute(
            &GetRandomCmd {
                bytes_requested: 8,
            },
            &mut sessions,
        );
        assert!(matches!(
            result,
            Err(TpmCommandError::AuthorizationFailed(
                SessionAuthError::HmacMismatch { .. }
            ))
        ));
    }

    struct LyingCmd;

    impl TpmCommand for LyingCmd {
        fn command_code(&self) -> CommandCode {
            tpm_protocol::CommandCodeEnum::GetRandom.into()
        }

        fn serialized_size(&self) -> usize {
            4 // declares four, writes two
        }

        fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

        fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
            writer.write_u16(8);
        }
    }

    #[test]
    #[should_panic(expected = "declared 4 serialized bytes but wrote 2")]
    fn test_size_consistency_violation_panics() {
        let mut executor = TpmExecutor::new(EchoTransport::new([]));
        let _ = executor.execute(&LyingCmd, &mut []);
    }
}
