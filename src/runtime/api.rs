//! API-facing request/response models for the run control surface.
//!
//! Transport layers parse inbound parameters into these types and map the
//! results back onto status codes; the core only sees structured calls.

use serde::{Deserialize, Serialize};

use crate::core::{
    Admission, AdmissionController, AdmissionError, HubStats, Release, RunRegistry, RunRequest,
};
use crate::util::serde::ReservationId;

/// Run creation payload as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    /// Client-chosen reservation id.
    pub uuid: Option<String>,
    /// Requested browser.
    pub browser: Option<String>,
    /// Requested operating system.
    pub os: Option<String>,
    /// Requested concurrent slots.
    pub thread_count: Option<i64>,
}

impl CreateRunRequest {
    /// Validate and convert into a core request.
    pub fn into_run_request(self) -> Result<RunRequest, AdmissionError> {
        let uuid = non_blank(self.uuid)
            .ok_or_else(|| AdmissionError::InvalidRequest("uuid must be passed in".into()))?;
        let browser = non_blank(self.browser)
            .ok_or_else(|| AdmissionError::InvalidRequest("browser must be passed in".into()))?;
        let thread_count = self
            .thread_count
            .ok_or_else(|| AdmissionError::InvalidRequest("threadCount must be passed in".into()))?;
        let concurrency = u32::try_from(thread_count)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                AdmissionError::InvalidRequest(format!(
                    "threadCount must be a positive integer, got {thread_count}"
                ))
            })?;
        Ok(RunRequest::new(
            uuid,
            browser,
            non_blank(self.os).as_deref(),
            concurrency,
        ))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Outcome of a run creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResponse {
    /// The run was admitted.
    Admitted(Admission),
    /// The run was rejected.
    Rejected(AdmissionError),
}

impl RunResponse {
    /// HTTP-style status code for the outcome.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Admitted(Admission::Fulfilled) => 202,
            Self::Admitted(Admission::NeedsScaling(_)) => 201,
            Self::Rejected(
                AdmissionError::HubCapacityExceeded { .. } | AdmissionError::ProvisioningFailure(_),
            ) => 409,
            Self::Rejected(AdmissionError::UnsupportedBrowser(_)) => 410,
            Self::Rejected(
                AdmissionError::DuplicateReservation(_) | AdmissionError::InvalidRequest(_),
            ) => 400,
        }
    }

    /// Whether the run was admitted.
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    /// Serializable body for the transport layer.
    pub fn to_body(&self) -> RunResponseBody {
        let (message, nodes_launched) = match self {
            Self::Admitted(Admission::Fulfilled) => ("request can be fulfilled".to_string(), None),
            Self::Admitted(Admission::NeedsScaling(count)) => {
                (format!("scaling out with {count} node(s)"), Some(*count))
            }
            Self::Rejected(e) => (e.to_string(), None),
        };
        RunResponseBody {
            status_code: self.status_code(),
            message,
            nodes_launched,
        }
    }
}

impl From<Result<Admission, AdmissionError>> for RunResponse {
    fn from(result: Result<Admission, AdmissionError>) -> Self {
        match result {
            Ok(admission) => Self::Admitted(admission),
            Err(e) => Self::Rejected(e),
        }
    }
}

/// Serialized run creation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponseBody {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Human-readable outcome.
    pub message: String,
    /// Nodes launched for a scale-out.
    pub nodes_launched: Option<u32>,
}

/// Outcome of a run deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRunResponse {
    /// Reservation the deletion targeted.
    pub reservation_id: ReservationId,
    /// Whether it was tracked.
    pub outcome: Release,
}

impl DeleteRunResponse {
    /// HTTP-style status code for the outcome.
    pub const fn status_code(&self) -> u16 {
        match self.outcome {
            Release::Deleted => 202,
            Release::NotFound => 409,
        }
    }
}

/// Free-slot report for a browser/OS pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSlotsResponse {
    /// Browser queried.
    pub browser: String,
    /// Operating system queried.
    pub os: Option<String>,
    /// Free matching slots (or slots claimed, for a claim).
    pub free_slots: u32,
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Registry counters.
    pub stats: HubStats,
}

/// Validate and admit a run.
pub async fn create_run(controller: &AdmissionController, req: CreateRunRequest) -> RunResponse {
    let request = match req.into_run_request() {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "run request failed validation");
            return RunResponse::Rejected(e);
        }
    };
    controller.request_run(&request).await.into()
}

/// Release a run.
pub fn delete_run(controller: &AdmissionController, uuid: &str) -> DeleteRunResponse {
    DeleteRunResponse {
        reservation_id: uuid.to_string(),
        outcome: controller.release_run(uuid),
    }
}

/// Report free matching slots without reserving them.
pub fn free_slots(
    controller: &AdmissionController,
    browser: &str,
    os: Option<&str>,
) -> FreeSlotsResponse {
    FreeSlotsResponse {
        browser: browser.to_string(),
        os: os.map(str::to_string),
        free_slots: controller.free_slots(browser, os),
    }
}

/// Claim every free matching slot under a reservation named after the browser.
pub fn claim_free_slots(
    controller: &AdmissionController,
    browser: &str,
    os: Option<&str>,
) -> Result<FreeSlotsResponse, AdmissionError> {
    Ok(FreeSlotsResponse {
        browser: browser.to_string(),
        os: os.map(str::to_string),
        free_slots: controller.claim_free_slots(browser, os)?,
    })
}

/// Return a health payload.
pub fn health(registry: &RunRegistry) -> Health {
    Health {
        ok: true,
        stats: registry.stats(),
    }
}
