// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The response codec registry: a lookup from command code to the
//! function that parses that command's response parameters, plus the
//! number of output handles the command returns.
//!
//! The envelope logic (header, handles, auth split) is identical for
//! every command; only the parameter payload shape differs. Keeping the
//! per-command parsers behind this indirection lets commands be added
//! without touching the executor, and a missing registration is caught
//! before any bytes are sent.
//!
//! A registry is an explicit, constructed instance passed into the
//! executor, never process-wide state, so independent devices and tests
//! cannot race on registration.

use crate::commands;
use crate::commands::ResponseBody;
use std::collections::HashMap;
use tpm_protocol::CommandCode;
use tpm_protocol::CommandCodeEnum;
use tpm_protocol::wire::TpmReader;
use tpm_protocol::wire::WireError;

/// Parses a response parameter area into a typed body. Receives the
/// decoded output handles for parsers that need them to type their
/// result.
pub type ResponseParseFn =
    for<'a, 'b> fn(&'b mut TpmReader<'a>, &[u32]) -> Result<ResponseBody<'a>, WireError>;

/// How to decode one command's response.
#[derive(Clone, Copy)]
pub struct ResponseCodec {
    /// Number of handles in the response handle area. Fixed per command.
    pub out_handles: usize,
    /// Parser for the response parameter area.
    pub parse: ResponseParseFn,
}

/// Registry of response codecs, keyed by command code.
pub struct ResponseRegistry {
    codecs: HashMap<u32, ResponseCodec>,
}

impl ResponseRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// A registry covering the built-in command set.
    pub fn builtin() -> Self {
        use crate::commands::*;

        let mut registry = Self::new();
        for (code, codec) in [
            (
                CommandCodeEnum::Startup,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_unit,
                },
            ),
            (
                CommandCodeEnum::Shutdown,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_unit,
                },
            ),
            (
                CommandCodeEnum::SelfTest,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_unit,
                },
            ),
            (
                CommandCodeEnum::GetRandom,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_get_random,
                },
            ),
            (
                CommandCodeEnum::StirRandom,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_unit,
                },
            ),
            (
                CommandCodeEnum::GetCapability,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_get_capability,
                },
            ),
            (
                CommandCodeEnum::PCR_Read,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_pcr_read,
                },
            ),
            (
                CommandCodeEnum::PCR_Extend,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_unit,
                },
            ),
            (
                CommandCodeEnum::StartAuthSession,
                ResponseCodec {
                    out_handles: 1,
                    parse: parse_start_auth_session,
                },
            ),
            (
                CommandCodeEnum::FlushContext,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_unit,
                },
            ),
            (
                CommandCodeEnum::ReadClock,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_read_clock,
                },
            ),
            (
                CommandCodeEnum::ReadPublic,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_read_public,
                },
            ),
            (
                CommandCodeEnum::NV_Read,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_nv_read,
                },
            ),
            (
                CommandCodeEnum::NV_Write,
                ResponseCodec {
                    out_handles: 0,
                    parse: parse_unit,
                },
            ),
        ] {
            registry.insert(code, codec);
        }

        registry
    }

    /// Register (or replace) the codec for a command code.
    pub fn insert(&mut self, code: CommandCodeEnum, codec: ResponseCodec) {
        self.codecs.insert(code as u32, codec);
    }

    /// Look up the codec for a command code.
    pub fn lookup(&self, code: CommandCode) -> Option<ResponseCodec> {
        self.codecs.get(&code.0.get()).copied()
    }
}
