// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The boundary to the document parser: turns a validated wire [`Message`]
//! into a [`Document`]. Plugin-payload semantics are out of scope here —
//! concrete parsers live outside this crate; this trait is what the
//! interactor depends on.

use async_trait::async_trait;
use cep_core::Document;
use cep_wire::Message;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed message id: {0}")]
    InvalidMessageId(String),
    #[error("unrecognized topic: {0}")]
    UnrecognizedTopic(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, message: &Message) -> Result<Document, ParseError>;
}
