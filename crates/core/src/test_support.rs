// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across crates (`test-support` feature).

use crate::document::{Document, DocumentStatus, DocumentType, PluginStep, UpstreamService};
use crate::ids::{CommandId, DocumentId, InstanceId, MessageId};
use chrono::Utc;

crate::builder! {
    pub struct DocumentBuilder => Document {
        into {
            document_id: DocumentId = "doc-test-1",
            command_id: CommandId = "11111111-1111-1111-1111-111111111111",
            message_id: MessageId = "aws.ssm.11111111-1111-1111-1111-111111111111.i-test",
            destination: InstanceId = "i-test",
        }
        set {
            doc_type: DocumentType = DocumentType::SendCommand,
            upstream_service: UpstreamService = UpstreamService::MessageDelivery,
            run_count: u32 = 0,
            status: DocumentStatus = DocumentStatus::Pending,
            plugins: Vec<PluginStep> = Vec::new(),
        }
        computed {
            created_at: chrono::DateTime<Utc> = Utc::now(),
        }
    }
}
