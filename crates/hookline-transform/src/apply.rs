//! Folding an endpoint's transformation chain over a payload.

use sea_orm::{DatabaseConnection, DbErr};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use hookline_relay_db::store;

use crate::executor::{execute, Dialect};

/// Apply all enabled transformations for an endpoint whose apply-to
/// matches, in creation order. Each transformation's output feeds the
/// next; one that errors is skipped and the chain continues from the most
/// recent successful value. If every transformation errors the input is
/// returned unchanged.
pub async fn apply_transformations(
    db: &DatabaseConnection,
    endpoint_id: Uuid,
    apply_to: &str,
    data: Value,
) -> Result<Value, DbErr> {
    let chain = store::transformations_for(db, endpoint_id, apply_to).await?;

    let mut result = data;
    for t in chain {
        let dialect = match t.dialect.parse::<Dialect>() {
            Ok(dialect) => dialect,
            Err(err) => {
                warn!(transformation = %t.name, id = %t.id, error = %err, "skipping transformation");
                continue;
            }
        };

        match execute(dialect, &t.script, &result) {
            Ok(value) => result = value,
            Err(err) => {
                warn!(transformation = %t.name, id = %t.id, error = %err, "transformation failed, skipping");
            }
        }
    }

    Ok(result)
}

/// Transform request headers and body for forwarding or replay.
///
/// Headers keep their pre-transformation value unless the chain produced
/// a JSON object for them.
pub async fn apply_request_transformations(
    db: &DatabaseConnection,
    endpoint_id: Uuid,
    headers: Value,
    body: Value,
) -> Result<(Value, Value), DbErr> {
    let transformed_headers =
        apply_transformations(db, endpoint_id, "request", headers.clone()).await?;
    let headers = if transformed_headers.is_object() {
        transformed_headers
    } else {
        headers
    };

    let body = apply_transformations(db, endpoint_id, "request", body).await?;

    Ok((headers, body))
}
