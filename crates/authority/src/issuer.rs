//! Capability issuance.

use crate::{Authority, CapabilityToken, Error, IssueRequest, Result};
use chrono::{DateTime, Utc};
use policy::{Decision, Resource, Subject};
use storage::{AuditKind, NewCapability};

impl Authority {
    /// Mint a capability bound to `request`, if policy allows it.
    ///
    /// A refused request leaves the store untouched.
    pub fn issue(&self, subject: &Subject, request: &IssueRequest) -> Result<CapabilityToken> {
        let now = self.clock.now();
        let result = self.try_issue(subject, request, now);

        if let Err(e) = &result {
            tracing::warn!(
                user_id = %subject.user_id,
                role = %subject.role,
                client_id = %request.intent.client_id,
                action_type = %request.action_type,
                reason = %e.reason_code(),
                "capability denied"
            );
            self.audit(
                now,
                AuditKind::Denied {
                    user_id: subject.user_id.clone(),
                    role: subject.role.to_string(),
                    client_id: request.intent.client_id.clone(),
                    reason: e.reason_code().to_string(),
                },
            );
        }
        result
    }

    fn try_issue(
        &self,
        subject: &Subject,
        request: &IssueRequest,
        now: DateTime<Utc>,
    ) -> Result<CapabilityToken> {
        self.validate_issue(request)?;

        if let Some(limiter) = &self.limiter {
            if !limiter.try_acquire(&subject.user_id, now) {
                return Err(Error::RateLimited);
            }
        }

        let resource = Resource::new(request.action_type.clone(), &request.intent.client_id);
        if let Decision::Deny { reason, message } = self.policy.evaluate(subject, &resource) {
            return Err(Error::denied(reason, message));
        }

        let record = self.store.mint(NewCapability {
            action_type: request.action_type.to_string(),
            client_id: request.intent.client_id.clone(),
            phone: request.intent.phone.clone(),
            issuer: subject.user_id.clone(),
            source_module: request.source_module.clone(),
            issued_at: now,
            expires_at: now + self.ttl,
        });

        tracing::info!(
            capability_id = %record.id(),
            user_id = %subject.user_id,
            role = %subject.role,
            action_type = %request.action_type,
            client_id = %request.intent.client_id,
            source_module = %request.source_module,
            expires_at = %record.expires_at(),
            "capability issued"
        );
        self.audit(
            now,
            AuditKind::Issued {
                capability_id: record.id().to_string(),
                user_id: subject.user_id.clone(),
                role: subject.role.to_string(),
                action_type: request.action_type.to_string(),
                client_id: request.intent.client_id.clone(),
                source_module: request.source_module.clone(),
                expires_at: record.expires_at(),
            },
        );

        Ok(CapabilityToken {
            capability_id: record.id().clone(),
            expires_at: record.expires_at(),
            expires_in_seconds: u64::try_from(self.ttl.num_seconds()).unwrap_or(0),
        })
    }

    fn validate_issue(&self, request: &IssueRequest) -> Result<()> {
        let required = [
            ("clientId", request.intent.client_id.as_str()),
            ("phone", request.intent.phone.as_str()),
            ("actionType", request.action_type.as_str()),
            ("sourceModule", request.source_module.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(Error::InvalidRequest(format!("{field} is required")));
        }
        if !self.handlers.contains_key(&request.action_type) {
            return Err(Error::InvalidRequest(format!(
                "unsupported action type {}",
                request.action_type
            )));
        }
        Ok(())
    }
}
