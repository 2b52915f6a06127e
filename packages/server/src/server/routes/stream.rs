//! SSE progress stream for one job.
//!
//! GET /api/discovery/jobs/:job_id/stream
//!
//! Emits a `progress` event whenever the job's progress changes and closes
//! after the terminal stage has been sent. Unknown jobs get a 404.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Extension, Path},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use lead_discovery::ProgressView;

use crate::server::app::AxumAppState;
use crate::server::routes::discovery::ApiError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

struct StreamState {
    state: AxumAppState,
    job_id: String,
    last: Option<ProgressView>,
    done: bool,
}

pub async fn job_stream_handler(
    Extension(state): Extension<AxumAppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if state.pipeline.progress(&job_id).is_none() {
        return Err(ApiError::not_found(format!("job not found: {}", job_id)));
    }

    let initial = StreamState {
        state,
        job_id,
        last: None,
        done: false,
    };
    let events = stream::unfold(initial, |mut s| async move {
        if s.done {
            return None;
        }
        loop {
            // Evicted mid-stream: stop quietly
            let progress = s.state.pipeline.progress(&s.job_id)?;
            if s.last.as_ref() != Some(&progress) {
                s.done = progress.stage.is_terminal();
                let event = Event::default()
                    .event("progress")
                    .json_data(&progress)
                    .unwrap_or_else(|_| Event::default().event("progress"));
                s.last = Some(progress);
                return Some((Ok(event), s));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
