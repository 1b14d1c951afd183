// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The capability data model: the discriminated union returned by a
//! capability query, re-expressed as a tagged enum so that consuming code
//! is exhaustiveness-checked instead of relying on runtime type tests.
//!
//! Exactly one variant is populated per query response, selected by the
//! `TPM_CAP` discriminator carried on the wire. The `more data available`
//! flag travels next to this union in the response body and is passed
//! through uninterpreted; repeating the query with an updated starting
//! value is the caller's responsibility.

use crate::AlgId;
use crate::CommandCode;
use crate::wire::TpmReader;
use crate::wire::TpmWriter;
use crate::wire::WireError;

/// Upper bound applied to every entry count decoded here. The largest
/// defined capability response fits a TPM's property buffer, which is far
/// below this; anything larger is a malformed response.
pub const MAX_CAP_ENTRIES: u32 = 4096;

/// Largest `sizeofSelect` accepted in a PCR selection.
pub const PCR_SELECT_MAX: usize = 8;

/// `TPM_CAP`, the capability-type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Capability {
    /// `TPM_CAP_ALGS`
    Algorithms = 0x00000000,
    /// `TPM_CAP_HANDLES`
    Handles = 0x00000001,
    /// `TPM_CAP_COMMANDS`
    Commands = 0x00000002,
    /// `TPM_CAP_PP_COMMANDS`
    PpCommands = 0x00000003,
    /// `TPM_CAP_AUDIT_COMMANDS`
    AuditCommands = 0x00000004,
    /// `TPM_CAP_PCRS`
    AssignedPcr = 0x00000005,
    /// `TPM_CAP_TPM_PROPERTIES`
    TpmProperties = 0x00000006,
    /// `TPM_CAP_PCR_PROPERTIES`
    PcrProperties = 0x00000007,
    /// `TPM_CAP_ECC_CURVES`
    EccCurves = 0x00000008,
    /// `TPM_CAP_AUTH_POLICIES`
    AuthPolicies = 0x00000009,
    /// `TPM_CAP_ACT`
    Act = 0x0000000a,
}

impl Capability {
    /// Decode a raw discriminator value.
    pub fn from_u32(val: u32) -> Option<Capability> {
        let ret = match val {
            0x00000000 => Self::Algorithms,
            0x00000001 => Self::Handles,
            0x00000002 => Self::Commands,
            0x00000003 => Self::PpCommands,
            0x00000004 => Self::AuditCommands,
            0x00000005 => Self::AssignedPcr,
            0x00000006 => Self::TpmProperties,
            0x00000007 => Self::PcrProperties,
            0x00000008 => Self::EccCurves,
            0x00000009 => Self::AuthPolicies,
            0x0000000a => Self::Act,
            _ => return None,
        };
        Some(ret)
    }
}

/// `TPMS_ALG_PROPERTY`: an algorithm id with its attribute mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgProperty {
    /// The algorithm.
    pub alg: AlgId,
    /// `TPMA_ALGORITHM` attribute bits.
    pub properties: u32,
}

/// `TPMA_CC`: per-command attribute word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAttributes(pub u32);

impl CommandAttributes {
    /// The command code embedded in bits 0-15.
    pub fn command_index(&self) -> u16 {
        self.0 as u16
    }
}

/// `TPMS_PCR_SELECTION`: a hash bank and a bitmap of selected PCRs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrSelection {
    /// The bank's hash algorithm.
    pub hash: AlgId,
    /// PCR bitmap, one bit per PCR, little slot first.
    pub select: Vec<u8>,
}

impl PcrSelection {
    /// Decode one selection.
    pub fn parse(reader: &mut TpmReader<'_>) -> Result<Self, WireError> {
        let hash = AlgId(reader.read_u16()?.into());
        let size_of_select = reader.read_u8()? as usize;
        if size_of_select > PCR_SELECT_MAX {
            return Err(WireError::OutOfBounds {
                value: size_of_select as u64,
                bound: PCR_SELECT_MAX as u64,
            });
        }
        let select = reader.read_bytes(size_of_select)?.to_vec();
        Ok(Self { hash, select })
    }

    /// Encode this selection.
    pub fn write(&self, writer: &mut TpmWriter<'_>) {
        writer.write_u16(self.hash.0.get());
        writer.write_u8(self.select.len() as u8);
        writer.write_bytes(&self.select);
    }

    /// Serialized size in bytes.
    pub fn wire_size(&self) -> usize {
        size_of::<u16>() + size_of::<u8>() + self.select.len()
    }
}

/// `TPMS_TAGGED_PROPERTY`: a 32-bit property identifier and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedProperty {
    /// `TPM_PT` property identifier.
    pub property: u32,
    /// The property value.
    pub value: u32,
}

/// `TPMS_TAGGED_PCR_SELECT`: a PCR property with the PCRs it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedPcrSelect {
    /// `TPM_PT_PCR` property identifier.
    pub tag: u32,
    /// PCR bitmap the property applies to.
    pub select: Vec<u8>,
}

/// `TPM_ECC_CURVE` identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EccCurve(pub u16);

/// `TPMS_TAGGED_POLICY`: a permanent handle and its auth policy digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedPolicy {
    /// The handle the policy is attached to.
    pub handle: u32,
    /// Hash algorithm of the policy digest.
    pub hash_alg: AlgId,
    /// The digest, sized by `hash_alg`.
    pub policy: Vec<u8>,
}

/// `TPMS_ACT_DATA`: an authenticated countdown timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActEntry {
    /// The ACT handle.
    pub handle: u32,
    /// Remaining timeout in seconds.
    pub timeout: u32,
    /// `TPMA_ACT` attribute bits.
    pub attributes: u32,
}

/// `TPMU_CAPABILITIES`, decoded: the closed set of result shapes a
/// capability query can return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityData {
    /// `TPML_ALG_PROPERTY`
    Algorithms(Vec<AlgProperty>),
    /// `TPML_HANDLE`
    Handles(Vec<u32>),
    /// `TPML_CCA`
    Commands(Vec<CommandAttributes>),
    /// `TPML_CC` of commands requiring physical presence.
    PpCommands(Vec<CommandCode>),
    /// `TPML_CC` of commands being audited.
    AuditCommands(Vec<CommandCode>),
    /// `TPML_PCR_SELECTION`
    AssignedPcr(Vec<PcrSelection>),
    /// `TPML_TAGGED_TPM_PROPERTY`
    TpmProperties(Vec<TaggedProperty>),
    /// `TPML_TAGGED_PCR_PROPERTY`
    PcrProperties(Vec<TaggedPcrSelect>),
    /// `TPML_ECC_CURVE`
    EccCurves(Vec<EccCurve>),
    /// `TPML_TAGGED_POLICY`
    AuthPolicies(Vec<TaggedPolicy>),
    /// `TPML_ACT_DATA`
    ActData(Vec<ActEntry>),
}

fn read_count(reader: &mut TpmReader<'_>) -> Result<u32, WireError> {
    let count = reader.read_u32()?;
    if count > MAX_CAP_ENTRIES {
        return Err(WireError::OutOfBounds {
            value: count as u64,
            bound: MAX_CAP_ENTRIES as u64,
        });
    }
    Ok(count)
}

impl CapabilityData {
    /// Decode a `TPMS_CAPABILITY_DATA`: the `TPM_CAP` discriminator
    /// followed by the selected list, entries kept in wire order.
    pub fn parse(reader: &mut TpmReader<'_>) -> Result<Self, WireError> {
        let raw_cap = reader.read_u32()?;
        let cap = Capability::from_u32(raw_cap).ok_or(WireError::InvalidSelector(raw_cap))?;

        let data = match cap {
            Capability::Algorithms => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(AlgProperty {
                        alg: AlgId(reader.read_u16()?.into()),
                        properties: reader.read_u32()?,
                    });
                }
                CapabilityData::Algorithms(entries)
            }
            Capability::Handles => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(reader.read_u32()?);
                }
                CapabilityData::Handles(entries)
            }
            Capability::Commands => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(CommandAttributes(reader.read_u32()?));
                }
                CapabilityData::Commands(entries)
            }
            Capability::PpCommands | Capability::AuditCommands => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(CommandCode(reader.read_u32()?.into()));
                }
                if cap == Capability::PpCommands {
                    CapabilityData::PpCommands(entries)
                } else {
                    CapabilityData::AuditCommands(entries)
                }
            }
            Capability::AssignedPcr => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(PcrSelection::parse(reader)?);
                }
                CapabilityData::AssignedPcr(entries)
            }
            Capability::TpmProperties => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(TaggedProperty {
                        property: reader.read_u32()?,
                        value: reader.read_u32()?,
                    });
                }
                CapabilityData::TpmProperties(entries)
            }
            Capability::PcrProperties => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let tag = reader.read_u32()?;
                    let size_of_select = reader.read_u8()? as usize;
                    if size_of_select > PCR_SELECT_MAX {
                        return Err(WireError::OutOfBounds {
                            value: size_of_select as u64,
                            bound: PCR_SELECT_MAX as u64,
                        });
                    }
                    let select = reader.read_bytes(size_of_select)?.to_vec();
                    entries.push(TaggedPcrSelect { tag, select });
                }
                CapabilityData::PcrProperties(entries)
            }
            Capability::EccCurves => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(EccCurve(reader.read_u16()?));
                }
                CapabilityData::EccCurves(entries)
            }
            Capability::AuthPolicies => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let handle = reader.read_u32()?;
                    // `TPMT_HA`: the digest length is dictated by the
                    // algorithm selector.
                    let hash_alg = AlgId(reader.read_u16()?.into());
                    let digest_size = hash_alg
                        .digest_size()
                        .ok_or(WireError::InvalidSelector(hash_alg.0.get() as u32))?;
                    let policy = reader.read_bytes(digest_size)?.to_vec();
                    entries.push(TaggedPolicy {
                        handle,
                        hash_alg,
                        policy,
                    });
                }
                CapabilityData::AuthPolicies(entries)
            }
            Capability::Act => {
                let count = read_count(reader)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(ActEntry {
                        handle: reader.read_u32()?,
                        timeout: reader.read_u32()?,
                        attributes: reader.read_u32()?,
                    });
                }
                CapabilityData::ActData(entries)
            }
        };

        Ok(data)
    }

    /// The discriminator this data decodes from.
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityData::Algorithms(_) => Capability::Algorithms,
            CapabilityData::Handles(_) => Capability::Handles,
            CapabilityData::Commands(_) => Capability::Commands,
            CapabilityData::PpCommands(_) => Capability::PpCommands,
            CapabilityData::AuditCommands(_) => Capability::AuditCommands,
            CapabilityData::AssignedPcr(_) => Capability::AssignedPcr,
            CapabilityData::TpmProperties(_) => Capability::TpmProperties,
            CapabilityData::PcrProperties(_) => Capability::PcrProperties,
            CapabilityData::EccCurves(_) => Capability::EccCurves,
            CapabilityData::AuthPolicies(_) => Capability::AuthPolicies,
            CapabilityData::ActData(_) => Capability::Act,
        }
    }
}
