// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bit-level decomposition of `TPM_RC` response codes.
//!
//! Two mutually exclusive encodings exist, distinguished by bit 7:
//!
//! - **Format zero** (bit 7 clear): a general error or warning. Error
//!   number in bits 0-6, version flag in bit 8, vendor flag in bit 10,
//!   warning (severity) flag in bit 11.
//! - **Format one** (bit 7 set): an error tied to a specific parameter,
//!   handle, or session. Error number in bits 0-5, parameter flag in
//!   bit 6, and a 4-bit number in bits 8-11 naming the associated entity.
//!
//! See Section 6.6, "Trusted Platform Module Library Part 2: Structures",
//! revision 1.38.

use bitfield_struct::bitfield;

/// Format-one flag (bit 7).
const RC_FMT1: u32 = 0x080;
/// Version-one flag for format-zero codes (bit 8).
const RC_VER1: u32 = 0x100;
/// Warning-class format-zero codes carry the severity and version flags.
const RC_WARN: u32 = 0x800 + RC_VER1;

/// Format-zero field layout.
#[bitfield(u32)]
struct FormatZero {
    #[bits(7)]
    error_number: u8,
    format_one: bool,
    version: bool,
    _reserved0: bool,
    vendor: bool,
    warning: bool,
    #[bits(20)]
    _reserved1: u32,
}

/// Format-one field layout.
#[bitfield(u32)]
struct FormatOne {
    #[bits(6)]
    error_number: u8,
    parameter: bool,
    format_one: bool,
    #[bits(4)]
    number: u8,
    #[bits(20)]
    _reserved: u32,
}

/// `TPM_RC`, a 32-bit response code.
///
/// Every operation on this type is total: undefined code values decode to
/// the "unknown" description rather than failing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct TpmRc(pub u32);

/// `TPM_RC_SUCCESS`
pub const TPM_RC_SUCCESS: TpmRc = TpmRc(0x000);
/// `TPM_RC_BAD_TAG`, returned for an unrecognized command tag.
pub const TPM_RC_BAD_TAG: TpmRc = TpmRc(0x01e);

/// `TPM_RC_INITIALIZE`
pub const TPM_RC_INITIALIZE: TpmRc = TpmRc(RC_VER1);
/// `TPM_RC_FAILURE`
pub const TPM_RC_FAILURE: TpmRc = TpmRc(RC_VER1 + 0x001);
/// `TPM_RC_SEQUENCE`
pub const TPM_RC_SEQUENCE: TpmRc = TpmRc(RC_VER1 + 0x003);
/// `TPM_RC_DISABLED`
pub const TPM_RC_DISABLED: TpmRc = TpmRc(RC_VER1 + 0x020);
/// `TPM_RC_EXCLUSIVE`
pub const TPM_RC_EXCLUSIVE: TpmRc = TpmRc(RC_VER1 + 0x021);
/// `TPM_RC_AUTH_TYPE`
pub const TPM_RC_AUTH_TYPE: TpmRc = TpmRc(RC_VER1 + 0x024);
/// `TPM_RC_AUTH_MISSING`
pub const TPM_RC_AUTH_MISSING: TpmRc = TpmRc(RC_VER1 + 0x025);
/// `TPM_RC_POLICY`
pub const TPM_RC_POLICY: TpmRc = TpmRc(RC_VER1 + 0x026);
/// `TPM_RC_PCR`
pub const TPM_RC_PCR: TpmRc = TpmRc(RC_VER1 + 0x027);
/// `TPM_RC_PCR_CHANGED`
pub const TPM_RC_PCR_CHANGED: TpmRc = TpmRc(RC_VER1 + 0x028);
/// `TPM_RC_UPGRADE`
pub const TPM_RC_UPGRADE: TpmRc = TpmRc(RC_VER1 + 0x02d);
/// `TPM_RC_TOO_MANY_CONTEXTS`
pub const TPM_RC_TOO_MANY_CONTEXTS: TpmRc = TpmRc(RC_VER1 + 0x02e);
/// `TPM_RC_AUTH_UNAVAILABLE`
pub const TPM_RC_AUTH_UNAVAILABLE: TpmRc = TpmRc(RC_VER1 + 0x02f);
/// `TPM_RC_REBOOT`
pub const TPM_RC_REBOOT: TpmRc = TpmRc(RC_VER1 + 0x030);
/// `TPM_RC_UNBALANCED`
pub const TPM_RC_UNBALANCED: TpmRc = TpmRc(RC_VER1 + 0x031);
/// `TPM_RC_COMMAND_SIZE`
pub const TPM_RC_COMMAND_SIZE: TpmRc = TpmRc(RC_VER1 + 0x042);
/// `TPM_RC_COMMAND_CODE`
pub const TPM_RC_COMMAND_CODE: TpmRc = TpmRc(RC_VER1 + 0x043);
/// `TPM_RC_AUTHSIZE`
pub const TPM_RC_AUTHSIZE: TpmRc = TpmRc(RC_VER1 + 0x044);
/// `TPM_RC_AUTH_CONTEXT`
pub const TPM_RC_AUTH_CONTEXT: TpmRc = TpmRc(RC_VER1 + 0x045);
/// `TPM_RC_NV_RANGE`
pub const TPM_RC_NV_RANGE: TpmRc = TpmRc(RC_VER1 + 0x046);
/// `TPM_RC_NV_SIZE`
pub const TPM_RC_NV_SIZE: TpmRc = TpmRc(RC_VER1 + 0x047);
/// `TPM_RC_NV_LOCKED`
pub const TPM_RC_NV_LOCKED: TpmRc = TpmRc(RC_VER1 + 0x048);
/// `TPM_RC_NV_AUTHORIZATION`
pub const TPM_RC_NV_AUTHORIZATION: TpmRc = TpmRc(RC_VER1 + 0x049);
/// `TPM_RC_NV_UNINITIALIZED`
pub const TPM_RC_NV_UNINITIALIZED: TpmRc = TpmRc(RC_VER1 + 0x04a);
/// `TPM_RC_NV_SPACE`
pub const TPM_RC_NV_SPACE: TpmRc = TpmRc(RC_VER1 + 0x04b);
/// `TPM_RC_NV_DEFINED`
pub const TPM_RC_NV_DEFINED: TpmRc = TpmRc(RC_VER1 + 0x04c);
/// `TPM_RC_BAD_CONTEXT`
pub const TPM_RC_BAD_CONTEXT: TpmRc = TpmRc(RC_VER1 + 0x050);
/// `TPM_RC_CPHASH`
pub const TPM_RC_CPHASH: TpmRc = TpmRc(RC_VER1 + 0x051);
/// `TPM_RC_PARENT`
pub const TPM_RC_PARENT: TpmRc = TpmRc(RC_VER1 + 0x052);
/// `TPM_RC_NEEDS_TEST`
pub const TPM_RC_NEEDS_TEST: TpmRc = TpmRc(RC_VER1 + 0x053);
/// `TPM_RC_NO_RESULT`
pub const TPM_RC_NO_RESULT: TpmRc = TpmRc(RC_VER1 + 0x054);
/// `TPM_RC_SENSITIVE`
pub const TPM_RC_SENSITIVE: TpmRc = TpmRc(RC_VER1 + 0x055);

/// `TPM_RC_ASYMMETRIC`
pub const TPM_RC_ASYMMETRIC: TpmRc = TpmRc(RC_FMT1 + 0x001);
/// `TPM_RC_ATTRIBUTES`
pub const TPM_RC_ATTRIBUTES: TpmRc = TpmRc(RC_FMT1 + 0x002);
/// `TPM_RC_HASH`
pub const TPM_RC_HASH: TpmRc = TpmRc(RC_FMT1 + 0x003);
/// `TPM_RC_VALUE`
pub const TPM_RC_VALUE: TpmRc = TpmRc(RC_FMT1 + 0x004);
/// `TPM_RC_HIERARCHY`
pub const TPM_RC_HIERARCHY: TpmRc = TpmRc(RC_FMT1 + 0x005);
/// `TPM_RC_KEY_SIZE`
pub const TPM_RC_KEY_SIZE: TpmRc = TpmRc(RC_FMT1 + 0x007);
/// `TPM_RC_MGF`
pub const TPM_RC_MGF: TpmRc = TpmRc(RC_FMT1 + 0x008);
/// `TPM_RC_MODE`
pub const TPM_RC_MODE: TpmRc = TpmRc(RC_FMT1 + 0x009);
/// `TPM_RC_TYPE`
pub const TPM_RC_TYPE: TpmRc = TpmRc(RC_FMT1 + 0x00a);
/// `TPM_RC_HANDLE`
pub const TPM_RC_HANDLE: TpmRc = TpmRc(RC_FMT1 + 0x00b);
/// `TPM_RC_KDF`
pub const TPM_RC_KDF: TpmRc = TpmRc(RC_FMT1 + 0x00c);
/// `TPM_RC_RANGE`
pub const TPM_RC_RANGE: TpmRc = TpmRc(RC_FMT1 + 0x00d);
/// `TPM_RC_AUTH_FAIL`
pub const TPM_RC_AUTH_FAIL: TpmRc = TpmRc(RC_FMT1 + 0x00e);
/// `TPM_RC_NONCE`
pub const TPM_RC_NONCE: TpmRc = TpmRc(RC_FMT1 + 0x00f);
/// `TPM_RC_PP`
pub const TPM_RC_PP: TpmRc = TpmRc(RC_FMT1 + 0x010);
/// `TPM_RC_SCHEME`
pub const TPM_RC_SCHEME: TpmRc = TpmRc(RC_FMT1 + 0x012);
/// `TPM_RC_SIZE`
pub const TPM_RC_SIZE: TpmRc = TpmRc(RC_FMT1 + 0x015);
/// `TPM_RC_SYMMETRIC`
pub const TPM_RC_SYMMETRIC: TpmRc = TpmRc(RC_FMT1 + 0x016);
/// `TPM_RC_TAG`
pub const TPM_RC_TAG: TpmRc = TpmRc(RC_FMT1 + 0x017);
/// `TPM_RC_SELECTOR`
pub const TPM_RC_SELECTOR: TpmRc = TpmRc(RC_FMT1 + 0x018);
/// `TPM_RC_INSUFFICIENT`
pub const TPM_RC_INSUFFICIENT: TpmRc = TpmRc(RC_FMT1 + 0x01a);
/// `TPM_RC_SIGNATURE`
pub const TPM_RC_SIGNATURE: TpmRc = TpmRc(RC_FMT1 + 0x01b);
/// `TPM_RC_KEY`
pub const TPM_RC_KEY: TpmRc = TpmRc(RC_FMT1 + 0x01c);
/// `TPM_RC_POLICY_FAIL`
pub const TPM_RC_POLICY_FAIL: TpmRc = TpmRc(RC_FMT1 + 0x01d);
/// `TPM_RC_INTEGRITY`
pub const TPM_RC_INTEGRITY: TpmRc = TpmRc(RC_FMT1 + 0x01f);
/// `TPM_RC_TICKET`
pub const TPM_RC_TICKET: TpmRc = TpmRc(RC_FMT1 + 0x020);
/// `TPM_RC_RESERVED_BITS`
pub const TPM_RC_RESERVED_BITS: TpmRc = TpmRc(RC_FMT1 + 0x021);
/// `TPM_RC_BAD_AUTH`
pub const TPM_RC_BAD_AUTH: TpmRc = TpmRc(RC_FMT1 + 0x022);
/// `TPM_RC_EXPIRED`
pub const TPM_RC_EXPIRED: TpmRc = TpmRc(RC_FMT1 + 0x023);
/// `TPM_RC_POLICY_CC`
pub const TPM_RC_POLICY_CC: TpmRc = TpmRc(RC_FMT1 + 0x024);
/// `TPM_RC_BINDING`
pub const TPM_RC_BINDING: TpmRc = TpmRc(RC_FMT1 + 0x025);
/// `TPM_RC_CURVE`
pub const TPM_RC_CURVE: TpmRc = TpmRc(RC_FMT1 + 0x026);
/// `TPM_RC_ECC_POINT`
pub const TPM_RC_ECC_POINT: TpmRc = TpmRc(RC_FMT1 + 0x027);

/// `TPM_RC_CONTEXT_GAP`
pub const TPM_RC_CONTEXT_GAP: TpmRc = TpmRc(RC_WARN + 0x001);
/// `TPM_RC_OBJECT_MEMORY`
pub const TPM_RC_OBJECT_MEMORY: TpmRc = TpmRc(RC_WARN + 0x002);
/// `TPM_RC_SESSION_MEMORY`
pub const TPM_RC_SESSION_MEMORY: TpmRc = TpmRc(RC_WARN + 0x003);
/// `TPM_RC_MEMORY`
pub const TPM_RC_MEMORY: TpmRc = TpmRc(RC_WARN + 0x004);
/// `TPM_RC_SESSION_HANDLES`
pub const TPM_RC_SESSION_HANDLES: TpmRc = TpmRc(RC_WARN + 0x005);
/// `TPM_RC_OBJECT_HANDLES`
pub const TPM_RC_OBJECT_HANDLES: TpmRc = TpmRc(RC_WARN + 0x006);
/// `TPM_RC_LOCALITY`
pub const TPM_RC_LOCALITY: TpmRc = TpmRc(RC_WARN + 0x007);
/// `TPM_RC_YIELDED`
pub const TPM_RC_YIELDED: TpmRc = TpmRc(RC_WARN + 0x008);
/// `TPM_RC_CANCELED`
pub const TPM_RC_CANCELED: TpmRc = TpmRc(RC_WARN + 0x009);
/// `TPM_RC_TESTING`
pub const TPM_RC_TESTING: TpmRc = TpmRc(RC_WARN + 0x00a);
/// `TPM_RC_NV_RATE`
pub const TPM_RC_NV_RATE: TpmRc = TpmRc(RC_WARN + 0x020);
/// `TPM_RC_LOCKOUT`
pub const TPM_RC_LOCKOUT: TpmRc = TpmRc(RC_WARN + 0x021);
/// `TPM_RC_RETRY`
pub const TPM_RC_RETRY: TpmRc = TpmRc(RC_WARN + 0x022);
/// `TPM_RC_NV_UNAVAILABLE`
pub const TPM_RC_NV_UNAVAILABLE: TpmRc = TpmRc(RC_WARN + 0x023);
/// `TPM_RC_NOT_USED`
pub const TPM_RC_NOT_USED: TpmRc = TpmRc(RC_WARN + 0x07f);

impl TpmRc {
    /// The raw 32-bit code.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Whether the code is `TPM_RC_SUCCESS`.
    pub fn is_success(self) -> bool {
        self == TPM_RC_SUCCESS
    }

    /// Whether bit 7 selects the format-one encoding.
    pub fn is_format_one(self) -> bool {
        FormatOne::from_bits(self.0).format_one()
    }

    /// Whether this is a warning-class format-zero code.
    pub fn is_warning(self) -> bool {
        let fields = FormatZero::from_bits(self.0);
        !fields.format_one() && fields.warning()
    }

    /// Whether this is a vendor-defined format-zero code.
    pub fn is_vendor(self) -> bool {
        let fields = FormatZero::from_bits(self.0);
        !fields.format_one() && fields.vendor()
    }

    /// The 1-based index of the offending command parameter, when this is
    /// a format-one code with the parameter flag set.
    pub fn parameter_number(self) -> Option<u8> {
        let fields = FormatOne::from_bits(self.0);
        if fields.format_one() && fields.parameter() && fields.number() >= 1 {
            Some(fields.number())
        } else {
            None
        }
    }

    /// The 1-based index of the offending handle, when this is a
    /// format-one code with the parameter flag clear and the number's top
    /// bit zero.
    pub fn handle_number(self) -> Option<u8> {
        let fields = FormatOne::from_bits(self.0);
        if fields.format_one()
            && !fields.parameter()
            && fields.number() & 0x8 == 0
            && fields.number() >= 1
        {
            Some(fields.number())
        } else {
            None
        }
    }

    /// The 1-based index of the offending authorization session, when
    /// this is a format-one code with the parameter flag clear and the
    /// number's top bit set.
    pub fn session_number(self) -> Option<u8> {
        let fields = FormatOne::from_bits(self.0);
        if fields.format_one() && !fields.parameter() && fields.number() & 0x8 != 0 {
            let number = fields.number() - 8;
            if number >= 1 { Some(number) } else { None }
        } else {
            None
        }
    }

    /// The code with the associated-entity bits masked out, suitable for
    /// table lookup.
    ///
    /// For format-one codes this keeps the format flag and the 6-bit
    /// error number; for format-zero codes it keeps the error number and
    /// the version/vendor/severity flags.
    pub fn base_error(self) -> TpmRc {
        if self.is_format_one() {
            TpmRc(RC_FMT1 | (self.0 & 0x03f))
        } else {
            TpmRc(self.0 & (0x07f | RC_VER1 | 0x400 | 0x800))
        }
    }

    /// A human-readable description of the base error, for diagnostics.
    ///
    /// Total over all 32-bit values; codes outside the defined
    /// enumeration describe themselves as unknown.
    pub fn description(self) -> &'static str {
        match self.base_error() {
            TPM_RC_SUCCESS => "command executed successfully",
            TPM_RC_BAD_TAG => "the tag value sent with the command is not valid",
            TPM_RC_INITIALIZE => "TPM not initialized by TPM2_Startup or already initialized",
            TPM_RC_FAILURE => "commands are not being accepted because of a TPM failure",
            TPM_RC_SEQUENCE => "improper use of a sequence handle",
            TPM_RC_DISABLED => "the command is disabled",
            TPM_RC_EXCLUSIVE => "command failed because audit sequence required exclusivity",
            TPM_RC_AUTH_TYPE => "authorization handle is not correct for the command",
            TPM_RC_AUTH_MISSING => {
                "the command requires an authorization session for a handle and it is not present"
            }
            TPM_RC_POLICY => "policy failure in math operation or an invalid authPolicy value",
            TPM_RC_PCR => "PCR check failed",
            TPM_RC_PCR_CHANGED => "PCR have changed since checked",
            TPM_RC_UPGRADE => "the TPM is in field upgrade mode",
            TPM_RC_TOO_MANY_CONTEXTS => "context ID counter is at maximum",
            TPM_RC_AUTH_UNAVAILABLE => {
                "authValue or authPolicy is not available for the selected entity"
            }
            TPM_RC_REBOOT => "a _TPM_Init and Startup(CLEAR) is required before the TPM can resume",
            TPM_RC_UNBALANCED => "the protection algorithms are not reasonably balanced",
            TPM_RC_COMMAND_SIZE => {
                "commandSize is inconsistent with the contents of the command buffer"
            }
            TPM_RC_COMMAND_CODE => "command code not supported",
            TPM_RC_AUTHSIZE => "the value of authorizationSize is out of range",
            TPM_RC_AUTH_CONTEXT => "use of an authorization session with a context command",
            TPM_RC_NV_RANGE => "NV offset+size is out of range",
            TPM_RC_NV_SIZE => "requested NV allocation size is larger than allowed",
            TPM_RC_NV_LOCKED => "NV access locked",
            TPM_RC_NV_AUTHORIZATION => "NV access authorization failed",
            TPM_RC_NV_UNINITIALIZED => {
                "an NV index is used before being initialized or saved state could not be restored"
            }
            TPM_RC_NV_SPACE => "insufficient space for NV allocation",
            TPM_RC_NV_DEFINED => "NV index or persistent object already defined",
            TPM_RC_BAD_CONTEXT => "context in TPM2_ContextLoad is not valid",
            TPM_RC_CPHASH => "cpHash value already set or not correct for use",
            TPM_RC_PARENT => "handle for parent is not a valid parent",
            TPM_RC_NEEDS_TEST => "some function needs testing",
            TPM_RC_NO_RESULT => {
                "an internal function cannot process a request due to an unspecified problem"
            }
            TPM_RC_SENSITIVE => "the sensitive area did not unmarshal correctly after decryption",
            TPM_RC_ASYMMETRIC => "asymmetric algorithm not correct or not supported",
            TPM_RC_ATTRIBUTES => "inconsistent attributes",
            TPM_RC_HASH => "hash algorithm not supported or not appropriate",
            TPM_RC_VALUE => "value is out of range or is not correct for the context",
            TPM_RC_HIERARCHY => "hierarchy is not enabled or is not correct for the use",
            TPM_RC_KEY_SIZE => "key size is not supported",
            TPM_RC_MGF => "mask generation function not supported",
            TPM_RC_MODE => "mode of operation not supported",
            TPM_RC_TYPE => "the type of the value is not appropriate for the use",
            TPM_RC_HANDLE => "the handle is not correct for the use",
            TPM_RC_KDF => "unsupported key derivation function",
            TPM_RC_RANGE => "value was out of allowed range",
            TPM_RC_AUTH_FAIL => {
                "the authorization HMAC check failed and the DA counter incremented"
            }
            TPM_RC_NONCE => "invalid nonce size or nonce value mismatch",
            TPM_RC_PP => "authorization requires assertion of physical presence",
            TPM_RC_SCHEME => "unsupported or incompatible scheme",
            TPM_RC_SIZE => "structure is the wrong size",
            TPM_RC_SYMMETRIC => "unsupported symmetric algorithm or key size",
            TPM_RC_TAG => "incorrect structure tag",
            TPM_RC_SELECTOR => "union selector is incorrect",
            TPM_RC_INSUFFICIENT => "not enough octets in the input buffer to unmarshal a value",
            TPM_RC_SIGNATURE => "the signature is not valid",
            TPM_RC_KEY => "key fields are not compatible with the selected use",
            TPM_RC_POLICY_FAIL => "a policy check failed",
            TPM_RC_INTEGRITY => "integrity check failed",
            TPM_RC_TICKET => "invalid ticket",
            TPM_RC_RESERVED_BITS => "reserved bits not set to zero as required",
            TPM_RC_BAD_AUTH => "authorization failure without DA implications",
            TPM_RC_EXPIRED => "the policy has expired",
            TPM_RC_POLICY_CC => {
                "the commandCode in the policy is not the commandCode of the command"
            }
            TPM_RC_BINDING => {
                "public and sensitive portions of an object are not cryptographically bound"
            }
            TPM_RC_CURVE => "curve not supported",
            TPM_RC_ECC_POINT => "point is not on the required curve",
            TPM_RC_CONTEXT_GAP => "gap for context ID is too large",
            TPM_RC_OBJECT_MEMORY => "out of memory for object contexts",
            TPM_RC_SESSION_MEMORY => "out of memory for session contexts",
            TPM_RC_MEMORY => "out of shared object/session memory",
            TPM_RC_SESSION_HANDLES => {
                "out of session handles; a session must be flushed before a new one may be created"
            }
            TPM_RC_OBJECT_HANDLES => "out of object handles; a reboot is required",
            TPM_RC_LOCALITY => "bad locality",
            TPM_RC_YIELDED => {
                "the TPM has suspended operation on the command; the command may be retried"
            }
            TPM_RC_CANCELED => "the command was canceled",
            TPM_RC_TESTING => "the TPM is performing self-tests",
            TPM_RC_NV_RATE => "the TPM is rate-limiting accesses to prevent wearout of NV",
            TPM_RC_LOCKOUT => "the TPM is in DA lockout mode",
            TPM_RC_RETRY => "the TPM was not able to start the command; retry might work",
            TPM_RC_NV_UNAVAILABLE => {
                "the command may require writing of NV and NV is not currently accessible"
            }
            TPM_RC_NOT_USED => "reserved value that shall not be returned by the TPM",
            TpmRc(base) => match base {
                // TPM_RC_REFERENCE_H0..H6
                0x910..=0x916 => "a handle in the handle area references an unloaded entity",
                // TPM_RC_REFERENCE_S0..S6
                0x918..=0x91e => "an authorization session handle references an unloaded session",
                _ => "unknown response code",
            },
        }
    }
}

impl std::fmt::Display for TpmRc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#05x} ({})", self.0, self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_DEFINED: &[TpmRc] = &[
        TPM_RC_SUCCESS,
        TPM_RC_BAD_TAG,
        TPM_RC_INITIALIZE,
        TPM_RC_FAILURE,
        TPM_RC_SEQUENCE,
        TPM_RC_DISABLED,
        TPM_RC_EXCLUSIVE,
        TPM_RC_AUTH_TYPE,
        TPM_RC_AUTH_MISSING,
        TPM_RC_POLICY,
        TPM_RC_PCR,
        TPM_RC_PCR_CHANGED,
        TPM_RC_UPGRADE,
        TPM_RC_TOO_MANY_CONTEXTS,
        TPM_RC_AUTH_UNAVAILABLE,
        TPM_RC_REBOOT,
        TPM_RC_UNBALANCED,
        TPM_RC_COMMAND_SIZE,
        TPM_RC_COMMAND_CODE,
        TPM_RC_AUTHSIZE,
        TPM_RC_AUTH_CONTEXT,
        TPM_RC_NV_RANGE,
        TPM_RC_NV_SIZE,
        TPM_RC_NV_LOCKED,
        TPM_RC_NV_AUTHORIZATION,
        TPM_RC_NV_UNINITIALIZED,
        TPM_RC_NV_SPACE,
        TPM_RC_NV_DEFINED,
        TPM_RC_BAD_CONTEXT,
        TPM_RC_CPHASH,
        TPM_RC_PARENT,
        TPM_RC_NEEDS_TEST,
        TPM_RC_NO_RESULT,
        TPM_RC_SENSITIVE,
        TPM_RC_ASYMMETRIC,
        TPM_RC_ATTRIBUTES,
        TPM_RC_HASH,
        TPM_RC_VALUE,
        TPM_RC_HIERARCHY,
        TPM_RC_KEY_SIZE,
        TPM_RC_MGF,
        TPM_RC_MODE,
        TPM_RC_TYPE,
        TPM_RC_HANDLE,
        TPM_RC_KDF,
        TPM_RC_RANGE,
        TPM_RC_AUTH_FAIL,
        TPM_RC_NONCE,
        TPM_RC_PP,
        TPM_RC_SCHEME,
        TPM_RC_SIZE,
        TPM_RC_SYMMETRIC,
        TPM_RC_TAG,
        TPM_RC_SELECTOR,
        TPM_RC_INSUFFICIENT,
        TPM_RC_SIGNATURE,
        TPM_RC_KEY,
        TPM_RC_POLICY_FAIL,
        TPM_RC_INTEGRITY,
        TPM_RC_TICKET,
        TPM_RC_RESERVED_BITS,
        TPM_RC_BAD_AUTH,
        TPM_RC_EXPIRED,
        TPM_RC_POLICY_CC,
        TPM_RC_BINDING,
        TPM_RC_CURVE,
        TPM_RC_ECC_POINT,
        TPM_RC_CONTEXT_GAP,
        TPM_RC_OBJECT_MEMORY,
        TPM_RC_SESSION_MEMORY,
        TPM_RC_MEMORY,
        TPM_RC_SESSION_HANDLES,
        TPM_RC_OBJECT_HANDLES,
        TPM_RC_LOCALITY,
        TPM_RC_YIELDED,
        TPM_RC_CANCELED,
        TPM_RC_TESTING,
        TPM_RC_NV_RATE,
        TPM_RC_LOCKOUT,
        TPM_RC_RETRY,
        TPM_RC_NV_UNAVAILABLE,
        TPM_RC_NOT_USED,
    ];

    #[test]
    fn test_defined_codes_have_descriptions() {
        for &rc in ALL_DEFINED {
            // Base error preserves the encoding format.
            assert_eq!(rc.base_error().is_format_one(), rc.is_format_one());
            // Deterministic, non-empty, known description.
            let desc = rc.description();
            assert!(!desc.is_empty());
            assert_ne!(desc, "unknown response code", "rc {:#x}", rc.value());
            assert_eq!(desc, rc.description());
        }
    }

    #[test]
    fn test_unknown_code_is_total() {
        let unknown = TpmRc(0xdead_0000);
        assert_eq!(unknown.description(), "unknown response code");
        assert_eq!(TpmRc(0x07e).description(), "unknown response code");
    }

    #[test]
    fn test_format_zero_fields() {
        assert!(!TPM_RC_FAILURE.is_format_one());
        assert!(!TPM_RC_FAILURE.is_warning());
        assert!(TPM_RC_RETRY.is_warning());
        assert!(TPM_RC_YIELDED.is_warning());
        assert!(!TPM_RC_AUTH_FAIL.is_warning());
        assert!(!TPM_RC_SUCCESS.is_warning());
        assert!(TpmRc(0x400 + 0x001).is_vendor());
    }

    #[test]
    fn test_parameter_association() {
        // TPM_RC_VALUE + RC_P + parameter 1 = 0x1c4.
        let rc = TpmRc(0x1c4);
        assert!(rc.is_format_one());
        assert_eq!(rc.parameter_number(), Some(1));
        assert_eq!(rc.handle_number(), None);
        assert_eq!(rc.session_number(), None);
        assert_eq!(rc.base_error(), TPM_RC_VALUE);

        // Parameter 15 is the largest encodable index.
        let rc = TpmRc(0xfc4);
        assert_eq!(rc.parameter_number(), Some(15));
    }

    #[test]
    fn test_handle_association() {
        // TPM_RC_HANDLE + handle 1 = 0x18b.
        let rc = TpmRc(0x18b);
        assert!(rc.is_format_one());
        assert_eq!(rc.handle_number(), Some(1));
        assert_eq!(rc.parameter_number(), None);
        assert_eq!(rc.session_number(), None);
        assert_eq!(rc.base_error(), TPM_RC_HANDLE);
        assert_eq!(rc.description(), "the handle is not correct for the use");

        // Handle 7 is the largest encodable index.
        let rc = TpmRc(0x78b);
        assert_eq!(rc.handle_number(), Some(7));
    }

    #[test]
    fn test_session_association() {
        // TPM_RC_AUTH_FAIL + session 1 = 0x98e.
        let rc = TpmRc(0x98e);
        assert!(rc.is_format_one());
        assert_eq!(rc.session_number(), Some(1));
        assert_eq!(rc.parameter_number(), None);
        assert_eq!(rc.handle_number(), None);
        assert_eq!(rc.base_error(), TPM_RC_AUTH_FAIL);

        // Session 7 is the largest encodable index.
        let rc = TpmRc(0xf8e);
        assert_eq!(rc.session_number(), Some(7));
    }

    #[test]
    fn test_index_ranges() {
        // Sweep every encodable associated number and check the documented
        // 1-based ranges.
        for number in 0u32..16 {
            let with_p = TpmRc(TPM_RC_VALUE.value() | 0x040 | (number << 8));
            match with_p.parameter_number() {
                Some(n) => assert!((1..=15).contains(&n)),
                None => assert_eq!(number, 0),
            }

            let without_p = TpmRc(TPM_RC_VALUE.value() | (number << 8));
            match without_p.handle_number() {
                Some(n) => {
                    assert!((1..=7).contains(&n));
                    assert!(number < 8);
                }
                None => assert!(number == 0 || number >= 8),
            }
            match without_p.session_number() {
                Some(n) => {
                    assert!((1..=7).contains(&n));
                    assert!(number > 8);
                }
                None => assert!(number <= 8),
            }
        }
    }
}
