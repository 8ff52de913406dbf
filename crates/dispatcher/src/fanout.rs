//! Fan-out poster
//!
//! Posts every selected representation of the envelope to every target, in
//! resolver order. The first error stops the loop; targets already posted
//! to are not notified.

use tracing::{debug, instrument, warn};

use contracts::{
    ContractError, DownstreamClient, DownstreamClientFactory, ForwardHeaders, MessageEnvelope,
    TargetId,
};

use crate::error::{DispatchError, DispatchStage};

/// Post `envelope` to `targets`
///
/// Returns the number of successful posts.
#[instrument(
    name = "fanout_post",
    skip(clients, targets, envelope, headers),
    fields(targets = targets.len(), content_type = %envelope.content_type)
)]
pub async fn post_to_targets<F>(
    clients: &F,
    targets: &[TargetId],
    envelope: &MessageEnvelope,
    headers: &ForwardHeaders,
) -> Result<usize, DispatchError>
where
    F: DownstreamClientFactory,
{
    let mut posts = 0;

    for target in targets {
        let client = clients
            .client_for(target)
            .map_err(|e| DispatchError::dispatch(DispatchStage::Connect, e))?;

        for &representation in envelope.content_type.representations() {
            let payload = envelope.payload_for(representation).ok_or_else(|| {
                DispatchError::dispatch(
                    DispatchStage::Post,
                    ContractError::downstream(
                        target.as_str(),
                        format!("no {representation} representation derived"),
                    ),
                )
            })?;

            let result = client.post(payload, headers).await;
            observability::record_target_post(
                target.as_str(),
                representation.as_str(),
                result.is_ok(),
            );

            if let Err(e) = result {
                warn!(target_id = %target, %representation, error = %e, "Post failed");
                return Err(DispatchError::dispatch(DispatchStage::Post, e));
            }
            posts += 1;
            debug!(target_id = %client.target(), %representation, "Posted");
        }
    }

    Ok(posts)
}
