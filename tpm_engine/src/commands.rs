// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Command inputs and typed response bodies for the supported command
//! set.
//!
//! A command input only knows how to describe itself: its command code,
//! the exact serialized size of its handle and parameter areas, and how
//! to write those two areas through a [`TpmWriter`]. Framing, the
//! authorization area, and submission belong to the executor. Command-set
//! completeness is a non-goal; this is the roster a host-side engine
//! needs for provisioning, measurement, and session management.

use thiserror::Error;
use tpm_protocol::AlgId;
use tpm_protocol::AlgIdEnum;
use tpm_protocol::CommandCode;
use tpm_protocol::CommandCodeEnum;
use tpm_protocol::SessionType;
use tpm_protocol::StartupType;
use tpm_protocol::capability::Capability;
use tpm_protocol::capability::CapabilityData;
use tpm_protocol::capability::PcrSelection;
use tpm_protocol::wire::TpmReader;
use tpm_protocol::wire::TpmWriter;
use tpm_protocol::wire::WireError;
use tpm_protocol::wire::size_2b;

/// The suggested minimal size for the buffer in `TPM2B_MAX_BUFFER`.
/// See Table 79, Section 10.4.8, "Trusted Platform Module Library Part 2: Structures", revision 1.38.
pub const MAX_DIGEST_BUFFER_SIZE: usize = 1024;

/// Largest number of selections accepted in a `TPML_PCR_SELECTION`.
pub const MAX_PCR_SELECTIONS: usize = 5;

/// Largest number of digests returned in a `TPML_DIGEST`.
pub const MAX_PCR_DIGESTS: u32 = 8;

/// Errors in the caller-supplied fields of a command input.
#[derive(Debug, Error)]
pub enum CommandInputError {
    /// A variable-length field exceeds its wire bound.
    #[error("input of {0} bytes exceeds the {1}-byte bound")]
    BufferTooLarge(usize, usize),
    /// Too many PCR selections for a `TPML_PCR_SELECTION`.
    #[error("{0} PCR selections exceed the bound of {MAX_PCR_SELECTIONS}")]
    TooManyPcrSelections(usize),
    /// A digest's length disagrees with its algorithm.
    #[error("digest of {len} bytes does not match algorithm {alg:#06x}")]
    DigestSizeMismatch {
        /// The declared algorithm.
        alg: u16,
        /// The actual digest length.
        len: usize,
    },
}

/// A command input: the capability the executor consumes.
///
/// Implementations must keep `serialized_size` exactly equal to the bytes
/// the two write operations produce; the executor sizes its scratch
/// buffer from the declared value and treats any disagreement as a codec
/// bug.
pub trait TpmCommand {
    /// The command code.
    fn command_code(&self) -> CommandCode;

    /// Exact serialized size of the handle area plus the parameter area.
    fn serialized_size(&self) -> usize;

    /// Write the handle area.
    fn write_handles(&self, writer: &mut TpmWriter<'_>);

    /// Write the parameter area.
    fn write_parameters(&self, writer: &mut TpmWriter<'_>);
}

/// `TPMT_SYM_DEF`: a symmetric algorithm selector. The key size and mode
/// are only on the wire when the algorithm is not `TPM_ALG_NULL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymDef {
    /// The symmetric algorithm.
    pub algorithm: AlgId,
    /// Key size in bits.
    pub key_bits: u16,
    /// Block cipher mode.
    pub mode: AlgId,
}

impl SymDef {
    /// `TPM_ALG_NULL`: no parameter encryption.
    pub fn null() -> Self {
        Self {
            algorithm: AlgIdEnum::NULL.into(),
            key_bits: 0,
            mode: AlgIdEnum::NULL.into(),
        }
    }

    /// AES-128-CFB, the interoperable default for session encryption.
    pub fn aes_128_cfb() -> Self {
        Self {
            algorithm: AlgIdEnum::AES.into(),
            key_bits: 128,
            mode: AlgIdEnum::CFB.into(),
        }
    }

    fn write(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u16(self.algorithm.0.get());
        if !self.algorithm.is_null() {
            writer.write_u16(self.key_bits);
            writer.write_u16(self.mode.0.get());
        }
    }

    fn wire_size(&self) -> usize {
        if self.algorithm.is_null() {
            size_of::<u16>()
        } else {
            3 * size_of::<u16>()
        }
    }
}

// === Startup / Shutdown === //

/// `TPM2_Startup`
pub struct StartupCmd {
    /// `TPM_SU` state selector.
    pub startup_type: StartupType,
}

impl TpmCommand for StartupCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::Startup.into()
    }

    fn serialized_size(&self) -> usize {
        size_of::<u16>()
    }

    fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u16(self.startup_type as u16);
    }
}

/// `TPM2_Shutdown`
pub struct ShutdownCmd {
    /// `TPM_SU` state selector.
    pub shutdown_type: StartupType,
}

impl TpmCommand for ShutdownCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::Shutdown.into()
    }

    fn serialized_size(&self) -> usize {
        size_of::<u16>()
    }

    fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u16(self.shutdown_type as u16);
    }
}

// === SelfTest === //

/// `TPM2_SelfTest`
pub struct SelfTestCmd {
    /// Test everything rather than only untested functions.
    pub full_test: bool,
}

impl TpmCommand for SelfTestCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::SelfTest.into()
    }

    fn serialized_size(&self) -> usize {
        size_of::<u8>()
    }

    fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u8(self.full_test as u8);
    }
}

// === GetRandom / StirRandom === //

/// `TPM2_GetRandom`
pub struct GetRandomCmd {
    /// Number of octets requested.
    pub bytes_requested: u16,
}

impl TpmCommand for GetRandomCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::GetRandom.into()
    }

    fn serialized_size(&self) -> usize {
        size_of::<u16>()
    }

    fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u16(self.bytes_requested);
    }
}

/// `TPM2_StirRandom`
pub struct StirRandomCmd {
    in_data: Vec<u8>,
}

impl StirRandomCmd {
    /// Additional entropy to fold into the TPM's random number generator.
    pub fn new(in_data: &[u8]) -> Result<Self, CommandInputError> {
        if in_data.len() > MAX_DIGEST_BUFFER_SIZE {
            return Err(CommandInputError::BufferTooLarge(
                in_data.len(),
                MAX_DIGEST_BUFFER_SIZE,
            ));
        }
        Ok(Self {
            in_data: in_data.to_vec(),
        })
    }
}

impl TpmCommand for StirRandomCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::StirRandom.into()
    }

    fn serialized_size(&self) -> usize {
        size_2b(self.in_data.len())
    }

    fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_2b(&self.in_data);
    }
}

// === GetCapability === //

/// `TPM2_GetCapability`
pub struct GetCapabilityCmd {
    /// Which capability group to query.
    pub capability: Capability,
    /// First property value to return.
    pub property: u32,
    /// Number of properties requested.
    pub property_count: u32,
}

impl TpmCommand for GetCapabilityCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::GetCapability.into()
    }

    fn serialized_size(&self) -> usize {
        3 * size_of::<u32>()
    }

    fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u32(self.capability as u32);
        writer.write_u32(self.property);
        writer.write_u32(self.property_count);
    }
}

// === PCR_Read / PCR_Extend === //

/// `TPM2_PCR_Read`
pub struct PcrReadCmd {
    pcr_selection_in: Vec<PcrSelection>,
}

impl PcrReadCmd {
    /// Select the PCR banks and registers to read.
    pub fn new(pcr_selection_in: &[PcrSelection]) -> Result<Self, CommandInputError> {
        if pcr_selection_in.len() > MAX_PCR_SELECTIONS {
            return Err(CommandInputError::TooManyPcrSelections(
                pcr_selection_in.len(),
            ));
        }
        Ok(Self {
            pcr_selection_in: pcr_selection_in.to_vec(),
        })
    }
}

impl TpmCommand for PcrReadCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::PCR_Read.into()
    }

    fn serialized_size(&self) -> usize {
        size_of::<u32>()
            + self
                .pcr_selection_in
                .iter()
                .map(|s| s.wire_size())
                .sum::<usize>()
    }

    fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u32(self.pcr_selection_in.len() as u32);
        for selection in &self.pcr_selection_in {
            selection.write(writer);
        }
    }
}

/// `TPM2_PCR_Extend`
pub struct PcrExtendCmd {
    pcr_handle: u32,
    digests: Vec<(AlgId, Vec<u8>)>,
}

impl PcrExtendCmd {
    /// Extend one PCR with one digest per bank. Each digest length must
    /// match its algorithm.
    pub fn new(pcr_handle: u32, digests: &[(AlgId, &[u8])]) -> Result<Self, CommandInputError> {
        let mut owned = Vec::with_capacity(digests.len());
        for (alg, digest) in digests {
            if alg.digest_size() != Some(digest.len()) {
                return Err(CommandInputError::DigestSizeMismatch {
                    alg: alg.0.get(),
                    len: digest.len(),
                });
            }
            owned.push((*alg, digest.to_vec()));
        }
        Ok(Self {
            pcr_handle,
            digests: owned,
        })
    }
}

impl TpmCommand for PcrExtendCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::PCR_Extend.into()
    }

    fn serialized_size(&self) -> usize {
        size_of::<u32>()
            + size_of::<u32>()
            + self
                .digests
                .iter()
                .map(|(_, digest)| size_of::<u16>() + digest.len())
                .sum::<usize>()
    }

    fn write_handles(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u32(self.pcr_handle);
    }

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        // `TPML_DIGEST_VALUES`: each digest is a `TPMT_HA`, raw bytes
        // sized by the algorithm rather than 2B-prefixed.
        writer.write_u32(self.digests.len() as u32);
        for (alg, digest) in &self.digests {
            writer.write_u16(alg.0.get());
            writer.write_bytes(digest);
        }
    }
}

// === StartAuthSession === //

/// `TPM2_StartAuthSession`
pub struct StartAuthSessionCmd {
    tpm_key: u32,
    bind: u32,
    nonce_caller: Vec<u8>,
    encrypted_salt: Vec<u8>,
    session_type: SessionType,
    symmetric: SymDef,
    auth_hash: AlgId,
}

impl StartAuthSessionCmd {
    /// An unbound, unsalted session: the common case for a plain HMAC or
    /// policy session.
    pub fn unbound_unsalted(
        session_type: SessionType,
        auth_hash: AlgId,
        nonce_caller: &[u8],
    ) -> Result<Self, CommandInputError> {
        if nonce_caller.len() > MAX_DIGEST_BUFFER_SIZE {
            return Err(CommandInputError::BufferTooLarge(
                nonce_caller.len(),
                MAX_DIGEST_BUFFER_SIZE,
            ));
        }
        Ok(Self {
            tpm_key: tpm_protocol::TPM20_RH_NULL.0.get(),
            bind: tpm_protocol::TPM20_RH_NULL.0.get(),
            nonce_caller: nonce_caller.to_vec(),
            encrypted_salt: Vec::new(),
            session_type,
            symmetric: SymDef::null(),
            auth_hash,
        })
    }
}

impl TpmCommand for StartAuthSessionCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::StartAuthSession.into()
    }

    fn serialized_size(&self) -> usize {
        2 * size_of::<u32>()
            + size_2b(self.nonce_caller.len())
            + size_2b(self.encrypted_salt.len())
            + size_of::<u8>()
            + self.symmetric.wire_size()
            + size_of::<u16>()
    }

    fn write_handles(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u32(self.tpm_key);
        writer.write_u32(self.bind);
    }

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_2b(&self.nonce_caller);
        writer.write_2b(&self.encrypted_salt);
        writer.write_u8(self.session_type as u8);
        self.symmetric.write(writer);
        writer.write_u16(self.auth_hash.0.get());
    }
}

// === FlushContext === //

/// `TPM2_FlushContext`
pub struct FlushContextCmd {
    /// The session or transient object context to flush. A parameter,
    /// not a handle, so it participates in cpHash as parameter 1.
    pub flush_handle: u32,
}

impl TpmCommand for FlushContextCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::FlushContext.into()
    }

    fn serialized_size(&self) -> usize {
        size_of::<u32>()
    }

    fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u32(self.flush_handle);
    }
}

// === ReadClock === //

/// `TPM2_ReadClock`
pub struct ReadClockCmd;

impl TpmCommand for ReadClockCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::ReadClock.into()
    }

    fn serialized_size(&self) -> usize {
        0
    }

    fn write_handles(&self, _writer: &mut TpmWriter<'_>) {}

    fn write_parameters(&self, _writer: &mut TpmWriter<'_>) {}
}

// === ReadPublic === //

/// `TPM2_ReadPublic`
pub struct ReadPublicCmd {
    /// Handle of the loaded object.
    pub object_handle: u32,
}

impl TpmCommand for ReadPublicCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::ReadPublic.into()
    }

    fn serialized_size(&self) -> usize {
        size_of::<u32>()
    }

    fn write_handles(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u32(self.object_handle);
    }

    fn write_parameters(&self, _writer: &mut TpmWriter<'_>) {}
}

// === NV_Read / NV_Write === //

/// `TPM2_NV_Read`
pub struct NvReadCmd {
    /// The authorization handle (owner, platform, or the index itself).
    pub auth_handle: u32,
    /// The NV index to read.
    pub nv_index: u32,
    /// Number of octets to read.
    pub size: u16,
    /// Octet offset into the index data.
    pub offset: u16,
}

impl TpmCommand for NvReadCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::NV_Read.into()
    }

    fn serialized_size(&self) -> usize {
        2 * size_of::<u32>() + 2 * size_of::<u16>()
    }

    fn write_handles(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u32(self.auth_handle);
        writer.write_u32(self.nv_index);
    }

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u16(self.size);
        writer.write_u16(self.offset);
    }
}

/// `TPM2_NV_Write`
pub struct NvWriteCmd {
    auth_handle: u32,
    nv_index: u32,
    data: Vec<u8>,
    offset: u16,
}

impl NvWriteCmd {
    /// Write `data` at `offset` into an NV index. Larger payloads must be
    /// chunked by the caller to the index's NV buffer size.
    pub fn new(
        auth_handle: u32,
        nv_index: u32,
        data: &[u8],
        offset: u16,
    ) -> Result<Self, CommandInputError> {
        if data.len() > MAX_DIGEST_BUFFER_SIZE {
            return Err(CommandInputError::BufferTooLarge(
                data.len(),
                MAX_DIGEST_BUFFER_SIZE,
            ));
        }
        Ok(Self {
            auth_handle,
            nv_index,
            data: data.to_vec(),
            offset,
        })
    }
}

impl TpmCommand for NvWriteCmd {
    fn command_code(&self) -> CommandCode {
        CommandCodeEnum::NV_Write.into()
    }

    fn serialized_size(&self) -> usize {
        2 * size_of::<u32>() + size_2b(self.data.len()) + size_of::<u16>()
    }

    fn write_handles(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u32(self.auth_handle);
        writer.write_u32(self.nv_index);
    }

    fn write_parameters(&self, writer: &mut TpmWriter<'_>) {
        writer.write_2b(&self.data);
        writer.write_u16(self.offset);
    }
}

// === Response bodies === //

/// `TPMS_TIME_INFO`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInfo {
    /// Milliseconds since TPM startup.
    pub time: u64,
    /// Milliseconds the TPM has been powered, total.
    pub clock: u64,
    /// Number of TPM resets.
    pub reset_count: u32,
    /// Number of TPM restarts/resumes since the last reset.
    pub restart_count: u32,
    /// Whether `clock` is known to be monotonic across power loss.
    pub safe: bool,
}

/// The typed response payload of a command, one variant per registered
/// response shape.
///
/// Variable-length payloads borrow from the executor's retained response
/// buffer rather than owning copies; they stay valid exactly as long as
/// that buffer (the borrow checker pins the executor until the reply is
/// dropped).
#[derive(Debug, PartialEq, Eq)]
pub enum ResponseBody<'a> {
    /// The command returns no response parameters.
    Unit,
    /// `TPM2_GetRandom`
    GetRandom {
        /// The random octets.
        random: &'a [u8],
    },
    /// `TPM2_GetCapability`
    GetCapability {
        /// More values of the requested type were not returned; repeat
        /// the query with an updated starting value to fetch them. The
        /// engine passes this through uninterpreted.
        more_data: bool,
        /// The decoded capability union.
        data: CapabilityData,
    },
    /// `TPM2_PCR_Read`
    PcrRead {
        /// PCR update counter at read time.
        update_counter: u32,
        /// The selection actually read.
        selection: Vec<PcrSelection>,
        /// The PCR values, in selection order.
        digests: Vec<&'a [u8]>,
    },
    /// `TPM2_StartAuthSession`; the session handle arrives as the
    /// response's output handle.
    StartAuthSession {
        /// The TPM's initial session nonce.
        nonce_tpm: &'a [u8],
    },
    /// `TPM2_ReadClock`
    ReadClock(TimeInfo),
    /// `TPM2_ReadPublic`
    ReadPublic {
        /// `TPM2B_PUBLIC` payload, still marshalled.
        public_area: &'a [u8],
        /// The object's name.
        name: &'a [u8],
        /// The object's qualified name.
        qualified_name: &'a [u8],
    },
    /// `TPM2_NV_Read`
    NvRead {
        /// The octets read.
        data: &'a [u8],
    },
}

pub(crate) fn parse_unit<'a>(
    _reader: &mut TpmReader<'a>,
    _out_handles: &[u32],
) -> Result<ResponseBody<'a>, WireError> {
    Ok(ResponseBody::Unit)
}

pub(crate) fn parse_get_random<'a>(
    reader: &mut TpmReader<'a>,
    _out_handles: &[u32],
) -> Result<ResponseBody<'a>, WireError> {
    let random = reader.read_2b()?;
    Ok(ResponseBody::GetRandom { random })
}

pub(crate) fn parse_get_capability<'a>(
    reader: &mut TpmReader<'a>,
    _out_handles: &[u32],
) -> Result<ResponseBody<'a>, WireError> {
    let more_data = reader.read_u8()? != 0;
    let data = CapabilityData::parse(reader)?;
    Ok(ResponseBody::GetCapability { more_data, data })
}

pub(crate) fn parse_pcr_read<'a>(
    reader: &mut TpmReader<'a>,
    _out_handles: &[u32],
) -> Result<ResponseBody<'a>, WireError> {
    let update_counter = reader.read_u32()?;

    let selection_count = reader.read_u32()?;
    if selection_count > MAX_PCR_SELECTIONS as u32 {
        return Err(WireError::OutOfBounds {
            value: selection_count as u64,
            bound: MAX_PCR_SELECTIONS as u64,
        });
    }
    let mut selection = Vec::new();
    for _ in 0..selection_count {
        selection.push(PcrSelection::parse(reader)?);
    }

    let digest_count = reader.read_u32()?;
    if digest_count > MAX_PCR_DIGESTS {
        return Err(WireError::OutOfBounds {
            value: digest_count as u64,
            bound: MAX_PCR_DIGESTS as u64,
        });
    }
    let mut digests = Vec::new();
    for _ in 0..digest_count {
        digests.push(reader.read_2b()?);
    }

    Ok(ResponseBody::PcrRead {
        update_counter,
        selection,
        digests,
    })
}

pub(crate) fn parse_start_auth_session<'a>(
    reader: &mut TpmReader<'a>,
    _out_handles: &[u32],
) -> Result<ResponseBody<'a>, WireError> {
    let nonce_tpm = reader.read_2b()?;
    Ok(ResponseBody::StartAuthSession { nonce_tpm })
}

pub(crate) fn parse_read_clock<'a>(
    reader: &mut TpmReader<'a>,
    _out_handles: &[u32],
) -> Result<ResponseBody<'a>, WireError> {
    let time = reader.read_u64()?;
    let clock = reader.read_u64()?;
    let reset_count = reader.read_u32()?;
    let restart_count = reader.read_u32()?;
    let safe = reader.read_u8()? != 0;
    Ok(ResponseBody::ReadClock(TimeInfo {
        time,
        clock,
        reset_count,
        restart_count,
        safe,
    }))
}

pub(crate) fn parse_read_public<'a>(
    reader: &mut TpmReader<'a>,
    _out_handles: &[u32],
) -> Result<ResponseBody<'a>, WireError> {
    let public_area = reader.read_2b()?;
    let name = reader.read_2b()?;
    let qualified_name = reader.read_2b()?;
    Ok(ResponseBody::ReadPublic {
        public_area,
        name,
        qualified_name,
    })
}

pub(crate) fn parse_nv_read<'a>(
    reader: &mut TpmReader<'a>,
    _out_handles: &[u32],
) -> Result<ResponseBody<'a>, WireError> {
    let data = reader.read_2b()?;
    Ok(ResponseBody::NvRead { data })
}
