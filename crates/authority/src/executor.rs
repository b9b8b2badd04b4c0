//! Capability consumption and action execution.

use crate::{ActionReceipt, Authority, Error, Intent, Result};
use policy::{ActionType, Subject};
use storage::{AuditKind, CapabilityId, CapabilityRecord, ConsumeError};

impl Authority {
    /// Spend a capability on `action_type` for `payload`, then perform the
    /// action.
    ///
    /// A blank token, a blank `clientId` or `phone`, or an action type with
    /// no handler is refused as an invalid request before the token is even
    /// looked up, so it never reports a lifecycle or binding reason.
    ///
    /// Otherwise checks run in order: token known, not expired, not already
    /// used, action type, owner, bound payload. All of them and the transition to
    /// consumed happen as one step on the record, so concurrent attempts on
    /// the same token produce at most one receipt. Any refusal leaves the
    /// record as it was (apart from marking it expired when it is).
    pub fn consume(
        &self,
        subject: &Subject,
        capability_id: &CapabilityId,
        action_type: &ActionType,
        payload: &Intent,
    ) -> Result<ActionReceipt> {
        let result = self.try_consume(subject, capability_id, action_type, payload);

        match &result {
            Ok(receipt) => self.audit(
                receipt.consumed_at,
                AuditKind::Consumed {
                    capability_id: capability_id.to_string(),
                    user_id: subject.user_id.clone(),
                    action_type: action_type.to_string(),
                    action_id: receipt.action_id.to_string(),
                },
            ),
            Err(e) => {
                tracing::warn!(
                    capability_id = %capability_id,
                    user_id = %subject.user_id,
                    action_type = %action_type,
                    client_id = %payload.client_id,
                    reason = %e.reason_code(),
                    "capability rejected"
                );
                self.audit(
                    self.clock.now(),
                    AuditKind::Rejected {
                        capability_id: capability_id.to_string(),
                        user_id: subject.user_id.clone(),
                        reason: e.reason_code().to_string(),
                    },
                );
            }
        }
        result
    }

    fn try_consume(
        &self,
        subject: &Subject,
        capability_id: &CapabilityId,
        action_type: &ActionType,
        payload: &Intent,
    ) -> Result<ActionReceipt> {
        if capability_id.as_str().trim().is_empty() {
            return Err(Error::InvalidRequest("capability token is required".into()));
        }
        if !payload.is_well_formed() {
            return Err(Error::InvalidRequest("clientId and phone are required".into()));
        }
        let handler = self.handlers.get(action_type).ok_or_else(|| {
            Error::InvalidRequest(format!("unsupported action type {action_type}"))
        })?;

        let now = self.clock.now();
        let record = self
            .store
            .consume(capability_id, now, &subject.user_id, |record| {
                check_binding(record, subject, action_type, payload)
            })
            .map_err(|e| match e {
                ConsumeError::Unknown => Error::CapabilityUnknown,
                ConsumeError::Expired => Error::CapabilityExpired,
                ConsumeError::Replay => Error::CapabilityReplay,
                ConsumeError::Rejected(e) => e,
            })?;

        let action_id = handler.perform(&record);
        tracing::info!(
            capability_id = %capability_id,
            user_id = %subject.user_id,
            role = %subject.role,
            action_type = %action_type,
            action_id = %action_id,
            client_id = record.bound_client_id(),
            source_module = record.source_module(),
            "capability consumed"
        );

        Ok(ActionReceipt {
            action_id,
            capability_id: capability_id.clone(),
            action_type: action_type.clone(),
            consumed_at: now,
        })
    }
}

fn check_binding(
    record: &CapabilityRecord,
    subject: &Subject,
    action_type: &ActionType,
    payload: &Intent,
) -> Result<()> {
    if record.action_type() != action_type.as_str() {
        return Err(Error::ActionTypeMismatch {
            expected: record.action_type().to_string(),
            actual: action_type.to_string(),
        });
    }
    if record.issuer() != subject.user_id {
        return Err(Error::SubjectMismatch);
    }
    if record.bound_client_id() != payload.client_id || record.bound_phone() != payload.phone {
        return Err(Error::PayloadMismatch);
    }
    Ok(())
}
