// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! TPM 2.0 protocol-level types: wire codec primitives, command and
//! response code enumerations, the response-code taxonomy, and the
//! capability data model, as defined in the TPM 2.0 Library specification.
//!
//! This crate is transport-agnostic and allocation-light; everything here
//! operates over caller-supplied byte windows in spec byte order
//! (big-endian throughout, no platform-endian fallback).

pub mod capability;
pub mod rc;
pub mod wire;

use self::packed_nums::*;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

#[allow(non_camel_case_types)]
pub mod packed_nums {
    //! Big-endian integer types used in wire structures.
    pub type u16_be = zerocopy::U16<zerocopy::BigEndian>;
    pub type u32_be = zerocopy::U32<zerocopy::BigEndian>;
    pub type u64_be = zerocopy::U64<zerocopy::BigEndian>;
}

/// Workaround to allow constructing a zerocopy U32 in a const context.
pub(crate) const fn new_u32_be(val: u32) -> u32_be {
    u32_be::from_bytes(val.to_be_bytes())
}

/// Workaround to allow constructing a zerocopy U16 in a const context.
pub(crate) const fn new_u16_be(val: u16) -> u16_be {
    u16_be::from_bytes(val.to_be_bytes())
}

/// Errors found while validating a response buffer against the response
/// framing rules, before any command-specific parsing happens.
#[derive(Debug, Error)]
pub enum ResponseValidationError {
    /// Fewer bytes than a response header arrived.
    #[error("response is too small to contain a response header")]
    ResponseSizeTooSmall,
    /// The header `size` field disagrees with the received byte count.
    #[error(
        "size {size} specified in the response header does not match the {received} bytes received"
    )]
    HeaderResponseSizeMismatch {
        /// Size declared by the response header.
        size: u32,
        /// Bytes actually produced by the transport.
        received: usize,
    },
    /// The declared response size exceeds the engine's response buffer.
    #[error("size {size} specified in the response header exceeds the maximum {max}")]
    HeaderResponseSizeTooLarge {
        /// Size declared by the response header.
        size: u32,
        /// Upper bound accepted by the engine.
        max: usize,
    },
    /// The response session tag is not a defined tag value.
    #[error("unknown session tag {response_session_tag:#06x} in the response header")]
    HeaderSessionTagInvalid {
        /// The tag value found in the response header.
        response_session_tag: u16,
    },
    /// The response session tag does not match the request framing.
    #[error(
        "unexpected session tag {response_session_tag:#06x} in the response header, expected {expected_session_tag:#06x}"
    )]
    HeaderSessionTagMismatch {
        /// The tag value found in the response header.
        response_session_tag: u16,
        /// The tag the request was framed with.
        expected_session_tag: u16,
    },
}

/// `TPM_HANDLE` for a reserved (permanent) entity.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct ReservedHandle(pub u32_be);

impl PartialEq<ReservedHandle> for u32 {
    fn eq(&self, other: &ReservedHandle) -> bool {
        other.0.get() == *self
    }
}

impl ReservedHandle {
    /// Build a handle from its type octet and offset within the range.
    pub const fn new(kind: u8, offset: u32) -> ReservedHandle {
        ReservedHandle(new_u32_be((kind as u32) << 24 | offset))
    }
}

/// Handle type octet for PCRs.
pub const TPM20_HT_PCR: u8 = 0x00;
/// Handle type octet for NV indices.
pub const TPM20_HT_NV_INDEX: u8 = 0x01;
/// Handle type octet for HMAC/loaded sessions.
pub const TPM20_HT_HMAC_SESSION: u8 = 0x02;
/// Handle type octet for policy sessions.
pub const TPM20_HT_POLICY_SESSION: u8 = 0x03;
/// Handle type octet for permanent handles.
pub const TPM20_HT_PERMANENT: u8 = 0x40;
/// Handle type octet for transient objects.
pub const TPM20_HT_TRANSIENT: u8 = 0x80;
/// Handle type octet for persistent objects.
pub const TPM20_HT_PERSISTENT: u8 = 0x81;

/// `TPM_RH_OWNER`
pub const TPM20_RH_OWNER: ReservedHandle = ReservedHandle::new(TPM20_HT_PERMANENT, 0x01);
/// `TPM_RH_NULL`
pub const TPM20_RH_NULL: ReservedHandle = ReservedHandle::new(TPM20_HT_PERMANENT, 0x07);
/// `TPM_RH_ENDORSEMENT`
pub const TPM20_RH_ENDORSEMENT: ReservedHandle = ReservedHandle::new(TPM20_HT_PERMANENT, 0x0b);
/// `TPM_RH_PLATFORM`
pub const TPM20_RH_PLATFORM: ReservedHandle = ReservedHandle::new(TPM20_HT_PERMANENT, 0x0c);
// `TPM_RS_PW` (not `TPM_RH_PW`)
// See Table 28, Section 7.4, "Trusted Platform Module Library Part 2: Structures", revision 1.38.
/// `TPM_RS_PW`, the handle of the always-available password session.
pub const TPM20_RS_PW: ReservedHandle = ReservedHandle::new(TPM20_HT_PERMANENT, 0x09);

/// `TPM_ST`, the structure tag that frames every command and response.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct SessionTag(pub u16_be);

impl PartialEq<SessionTag> for u16 {
    fn eq(&self, other: &SessionTag) -> bool {
        other.0.get() == *self
    }
}

impl SessionTag {
    const fn new(val: u16) -> SessionTag {
        SessionTag(new_u16_be(val))
    }
}

/// Defined `TPM_ST` tag values used in command/response framing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum SessionTagEnum {
    /// No structure type specified.
    Null = 0x8000,
    /// A command/response with no attached sessions.
    NoSessions = 0x8001,
    /// A command/response with one or more attached sessions; the
    /// parameter-size field is present in the response.
    Sessions = 0x8002,
}

impl From<SessionTagEnum> for SessionTag {
    fn from(x: SessionTagEnum) -> Self {
        SessionTag::new(x as u16)
    }
}

impl SessionTagEnum {
    /// Decode a raw tag value.
    pub fn from_u16(val: u16) -> Option<SessionTagEnum> {
        let ret = match val {
            0x8000 => Self::Null,
            0x8001 => Self::NoSessions,
            0x8002 => Self::Sessions,
            _ => return None,
        };
        Some(ret)
    }
}

/// `TPM_CC`, a command code in wire representation.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq, Hash)]
pub struct CommandCode(pub u32_be);

impl PartialEq<CommandCode> for u32 {
    fn eq(&self, other: &CommandCode) -> bool {
        other.0.get() == *self
    }
}

impl CommandCode {
    const fn new(val: u32) -> CommandCode {
        CommandCode(new_u32_be(val))
    }

    /// Map to the closed enumeration, if the code is one this crate names.
    pub fn into_enum(self) -> Option<CommandCodeEnum> {
        CommandCodeEnum::from_u32(self.0.get())
    }
}

/// The command codes this engine can name.
///
/// This is the subset of Part 2 Table 12 that the host-side engine
/// issues or diagnoses; command-set completeness is a non-goal.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandCodeEnum {
    EvictControl = 0x00000120,
    HierarchyChangeAuth = 0x00000129,
    NV_DefineSpace = 0x0000012a,
    CreatePrimary = 0x00000131,
    NV_Write = 0x00000137,
    PCR_Reset = 0x0000013d,
    SelfTest = 0x00000143,
    Startup = 0x00000144,
    Shutdown = 0x00000145,
    StirRandom = 0x00000146,
    NV_Read = 0x0000014e,
    FlushContext = 0x00000165,
    NV_ReadPublic = 0x00000169,
    PolicyGetDigest = 0x00000189,
    ReadPublic = 0x00000173,
    StartAuthSession = 0x00000176,
    GetCapability = 0x0000017a,
    GetRandom = 0x0000017b,
    GetTestResult = 0x0000017c,
    PCR_Read = 0x0000017e,
    PolicyPCR = 0x0000017f,
    ReadClock = 0x00000181,
    PCR_Extend = 0x00000182,
}

impl From<CommandCodeEnum> for CommandCode {
    fn from(x: CommandCodeEnum) -> Self {
        CommandCode::new(x as u32)
    }
}

impl CommandCodeEnum {
    /// Decode a raw command code value.
    pub fn from_u32(val: u32) -> Option<CommandCodeEnum> {
        let ret = match val {
            0x00000120 => Self::EvictControl,
            0x00000129 => Self::HierarchyChangeAuth,
            0x0000012a => Self::NV_DefineSpace,
            0x00000131 => Self::CreatePrimary,
            0x00000137 => Self::NV_Write,
            0x0000013d => Self::PCR_Reset,
            0x00000143 => Self::SelfTest,
            0x00000144 => Self::Startup,
            0x00000145 => Self::Shutdown,
            0x00000146 => Self::StirRandom,
            0x0000014e => Self::NV_Read,
            0x00000165 => Self::FlushContext,
            0x00000169 => Self::NV_ReadPublic,
            0x00000189 => Self::PolicyGetDigest,
            0x00000173 => Self::ReadPublic,
            0x00000176 => Self::StartAuthSession,
            0x0000017a => Self::GetCapability,
            0x0000017b => Self::GetRandom,
            0x0000017c => Self::GetTestResult,
            0x0000017e => Self::PCR_Read,
            0x0000017f => Self::PolicyPCR,
            0x00000181 => Self::ReadClock,
            0x00000182 => Self::PCR_Extend,
            _ => return None,
        };

        Some(ret)
    }
}

/// `TPM_ALG_ID` in wire representation.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct AlgId(pub u16_be);

impl PartialEq<AlgId> for u16 {
    fn eq(&self, other: &AlgId) -> bool {
        other.0.get() == *self
    }
}

impl AlgId {
    const fn new(val: u16) -> AlgId {
        AlgId(new_u16_be(val))
    }

    /// Digest length in bytes, for hash algorithms.
    pub fn digest_size(&self) -> Option<usize> {
        let size = match AlgIdEnum::from_u16(self.0.get())? {
            AlgIdEnum::SHA => 20,
            AlgIdEnum::SHA256 => 32,
            AlgIdEnum::SHA384 => 48,
            AlgIdEnum::SHA512 => 64,
            AlgIdEnum::SM3_256 => 32,
            _ => return None,
        };
        Some(size)
    }

    /// Whether this is a real (non-null) algorithm selector.
    pub fn is_null(&self) -> bool {
        *self == AlgIdEnum::NULL.into()
    }
}

/// Defined `TPM_ALG_ID` values used by this engine.
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AlgIdEnum {
    RSA = 0x0001,
    SHA = 0x0004,
    HMAC = 0x0005,
    AES = 0x0006,
    SHA256 = 0x000b,
    SHA384 = 0x000c,
    SHA512 = 0x000d,
    NULL = 0x0010,
    SM3_256 = 0x0012,
    ECC = 0x0023,
    CFB = 0x0043,
}

impl From<AlgIdEnum> for AlgId {
    fn from(x: AlgIdEnum) -> Self {
        AlgId::new(x as u16)
    }
}

impl AlgIdEnum {
    /// Decode a raw algorithm id.
    pub fn from_u16(val: u16) -> Option<AlgIdEnum> {
        let ret = match val {
            0x0001 => Self::RSA,
            0x0004 => Self::SHA,
            0x0005 => Self::HMAC,
            0x0006 => Self::AES,
            0x000b => Self::SHA256,
            0x000c => Self::SHA384,
            0x000d => Self::SHA512,
            0x0010 => Self::NULL,
            0x0012 => Self::SM3_256,
            0x0023 => Self::ECC,
            0x0043 => Self::CFB,
            _ => return None,
        };

        Some(ret)
    }
}

/// `TPM_SE`, the session type requested by StartAuthSession.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionType {
    /// HMAC authorization session.
    Hmac = 0x00,
    /// Policy session.
    Policy = 0x01,
    /// Trial policy session (computes a policy digest without binding).
    Trial = 0x03,
}

/// `TPM_SU`, the startup/shutdown state selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StartupType {
    /// `TPM_SU_CLEAR`
    Clear = 0x0000,
    /// `TPM_SU_STATE`
    State = 0x0001,
}

/// Common structs shared between command / response framing.
pub mod headers {
    use super::*;

    /// The fixed 10-byte header that starts every request.
    #[repr(C)]
    #[derive(Debug, IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct CmdHeader {
        /// `TPM_ST` framing tag.
        pub session_tag: SessionTag,
        /// Exact total byte length of the request.
        pub size: u32_be,
        /// `TPM_CC` of the command.
        pub command_code: CommandCode,
    }

    impl CmdHeader {
        /// Construct a header with the final request size filled in.
        pub fn new(session_tag: SessionTag, size: u32, command_code: CommandCode) -> CmdHeader {
            CmdHeader {
                session_tag,
                size: size.into(),
                command_code,
            }
        }
    }

    /// The fixed 10-byte header that starts every response.
    #[repr(C)]
    #[derive(Debug, IntoBytes, Immutable, KnownLayout, FromBytes)]
    pub struct ReplyHeader {
        /// `TPM_ST` framing tag.
        pub session_tag: u16_be,
        /// Exact total byte length of the response.
        pub size: u32_be,
        /// `TPM_RC` of the command.
        pub response_code: u32_be,
    }

    impl ReplyHeader {
        /// Performs the command-agnostic validation checks on a received
        /// response:
        ///
        /// - at least a header's worth of bytes arrived,
        /// - the declared size matches the received byte count exactly and
        ///   fits the engine's buffer bound,
        /// - the session tag is a defined value and, on success, matches
        ///   the request framing (a failed command always comes back as
        ///   `NoSessions`).
        ///
        /// Returns the decoded header on success. The response code is not
        /// interpreted here beyond the tag rule; callers decide what a
        /// non-success code means.
        pub fn validate(
            received: &[u8],
            expected_tag: SessionTag,
            max_size: usize,
        ) -> Result<ReplyHeader, ResponseValidationError> {
            let header = ReplyHeader::read_from_prefix(received)
                .map_err(|_| ResponseValidationError::ResponseSizeTooSmall)?
                .0;

            let size = header.size.get();
            if size as usize > max_size {
                return Err(ResponseValidationError::HeaderResponseSizeTooLarge {
                    size,
                    max: max_size,
                });
            }

            if size as usize != received.len() {
                return Err(ResponseValidationError::HeaderResponseSizeMismatch {
                    size,
                    received: received.len(),
                });
            }

            let tag = header.session_tag.get();
            if SessionTagEnum::from_u16(tag).is_none() {
                return Err(ResponseValidationError::HeaderSessionTagInvalid {
                    response_session_tag: tag,
                });
            }

            // A command that fails is framed as NoSessions regardless of the
            // request tag.
            // See Section 6.1, "Trusted Platform Module Library Part 3: Commands", revision 1.38.
            let command_succeeded = header.response_code.get() == 0;
            if command_succeeded && tag != expected_tag {
                return Err(ResponseValidationError::HeaderSessionTagMismatch {
                    response_session_tag: tag,
                    expected_session_tag: expected_tag.0.get(),
                });
            }

            Ok(header)
        }
    }
}
