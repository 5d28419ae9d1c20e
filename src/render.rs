//! Text rendering of statuses, predictions and errors

use crate::error::SentiError;
use crate::invoker::Prediction;
use crate::resolver::StatusEvent;
use crate::session::Outcome;

/// One status line
pub fn render_status(event: StatusEvent) -> String {
    event.to_string()
}

/// JSON payload followed by the time-taken line
pub fn render_prediction(prediction: &Prediction) -> String {
    format!(
        "{}\nTime taken: {:.2} seconds ({}).",
        prediction.payload,
        prediction.elapsed_seconds(),
        prediction.label()
    )
}

/// User-facing message for an error
pub fn render_error(error: &SentiError) -> String {
    match error {
        SentiError::MissingInput => "Input some query".to_string(),
        SentiError::ModelUnavailable => "The model is not loaded.".to_string(),
        other => other.to_string(),
    }
}

/// Final text of a classification request
pub fn render_outcome(outcome: &Outcome) -> String {
    match &outcome.result {
        Ok(prediction) => render_prediction(prediction),
        Err(e) => render_error(e),
    }
}
