//! The operation dispatcher.
//!
//! Maps the externally-named operations onto engine calls. Validation only:
//! parameters are parsed by the typed constructors in [`params`], results
//! are serialized here at the transport boundary, and every engine error
//! passes through unchanged. Unknown names are `NotFound`.

mod params;

use crate::Service;
use cuemark_engine::error::{ErrorKind, Result};
use cuemark_engine::{Breakdown, Engine};
use exn::ResultExt;
use params::{AddParams, EditParams, IdParams, PurgeTargetParams, QueryParams, SectionParams, ShiftParams};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

pub use params::Params;

pub(crate) async fn dispatch(service: &Service, op: &str, params: &Params) -> Result<Value> {
    match op {
        // Lifecycle transitions bypass the engine handle on purpose:
        // `resume` must work while there is no engine to be had.
        "suspend" => {
            service.suspend().await?;
            Ok(ok())
        },
        "resume" => {
            service.resume().await?;
            Ok(ok())
        },
        _ => {
            let engine = service.engine().await?;
            engine_op(&engine, op, params).await
        },
    }
}

async fn engine_op(engine: &Engine, op: &str, params: &Params) -> Result<Value> {
    match op {
        "query" => {
            let p = QueryParams::from_params(params)?;
            wire(engine.markers_for_parents(&p.keys).await?)
        },
        "add" => {
            let p = AddParams::from_params(params)?;
            wire(engine.add(p.metadata_id, p.start, p.end, p.kind, p.is_final).await?)
        },
        "edit" => {
            let p = EditParams::from_params(params)?;
            wire(engine.edit(p.id, p.start, p.end, p.kind, p.is_final, p.user_created).await?)
        },
        "delete" => {
            let p = IdParams::from_params(params)?;
            wire(engine.delete(p.id).await?)
        },
        "shift" => {
            let p = ShiftParams::from_params(params)?;
            wire(engine.shift(p.id, p.d_start, p.d_end, p.force, &p.ignored).await?)
        },
        "check_shift" => {
            let p = IdParams::from_params(params)?;
            wire(engine.check_shift(p.id).await?)
        },
        "get_sections" => wire(engine.libraries().await?),
        "get_section" => {
            let p = IdParams::from_params(params)?;
            wire(engine.section_items(p.id).await?)
        },
        "get_seasons" => {
            let p = IdParams::from_params(params)?;
            wire(engine.seasons(p.id).await?)
        },
        "get_episodes" => {
            let p = IdParams::from_params(params)?;
            wire(engine.episodes(p.id).await?)
        },
        "get_stats" => {
            let p = IdParams::from_params(params)?;
            Ok(breakdown_value(&engine.section_stats(p.id).await?))
        },
        "purge_check" => {
            let p = IdParams::from_params(params)?;
            wire(engine.purge_check(p.id).await?)
        },
        "all_purges" => {
            let p = SectionParams::from_params(params)?;
            wire(engine.all_purges(p.section_id).await?)
        },
        "restore" => {
            let p = PurgeTargetParams::from_params(params)?;
            wire(engine.restore(p.marker_id, p.section_id).await?)
        },
        "ignore_purge" => {
            let p = PurgeTargetParams::from_params(params)?;
            engine.ignore_purge(p.marker_id, p.section_id).await?;
            Ok(ok())
        },
        _ => exn::bail!(ErrorKind::NotFound(format!("operation '{op}'"))),
    }
}

fn ok() -> Value {
    json!({ "ok": true })
}

fn wire<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).or_raise(|| ErrorKind::Internal)
}

/// Breakdown serialization lives here at the transport boundary; the
/// engine type keeps its packed bucket representation private.
fn breakdown_value(breakdown: &Breakdown) -> Value {
    fn stringify<K: ToString>(map: &BTreeMap<K, u64>) -> BTreeMap<String, u64> {
        map.iter().map(|(key, count)| (key.to_string(), *count)).collect()
    }
    json!({
        "items": breakdown.items(),
        "totalMarkers": breakdown.total_markers(),
        "totalIntros": breakdown.total_intros(),
        "totalCredits": breakdown.total_credits(),
        "itemsWithMarkers": breakdown.items_with_markers(),
        "itemsWithIntros": breakdown.items_with_intros(),
        "itemsWithCredits": breakdown.items_with_credits(),
        "buckets": stringify(breakdown.buckets()),
        "collapsedBuckets": stringify(breakdown.collapsed_buckets()),
        "introBuckets": stringify(breakdown.intro_buckets()),
        "creditsBuckets": stringify(breakdown.credits_buckets()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testkit;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_add_query_delete_flow() {
        let (service, tree, _dir) = testkit::service().await;
        let episode = tree.episodes[0].to_string();

        let added = service
            .dispatch(
                "add",
                &params(&[
                    ("metadataId", &episode),
                    ("start", "0"),
                    ("end", "1000"),
                    ("type", "intro"),
                    ("final", "0"),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(added["index"], 0);
        assert_eq!(added["type"], "intro");

        let queried = service.dispatch("query", &params(&[("keys", &episode)])).await.unwrap();
        assert_eq!(queried[&episode].as_array().unwrap().len(), 1);

        let id = added["id"].to_string();
        let deleted = service.dispatch("delete", &params(&[("id", &id)])).await.unwrap();
        assert_eq!(deleted["id"], added["id"]);
        let queried = service.dispatch("query", &params(&[("keys", &episode)])).await.unwrap();
        assert!(queried[&episode].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_operation_is_not_found() {
        let (service, _, _dir) = testkit::service().await;
        let err = service.dispatch("frobnicate", &Params::new()).await.unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_parse_failure_is_bad_request_and_engine_errors_pass_through() {
        let (service, tree, _dir) = testkit::service().await;
        let err = service.dispatch("delete", &params(&[("id", "banana")])).await.unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::BadRequest(_)));

        let err = service.dispatch("delete", &params(&[("id", "424242")])).await.unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::NotFound(_)));

        let show = tree.show.to_string();
        let err = service
            .dispatch(
                "add",
                &params(&[("metadataId", &show), ("start", "0"), ("end", "1000"), ("type", "intro")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::BadTarget(_)));
    }

    #[tokio::test]
    async fn test_shift_over_the_wire() {
        let (service, tree, _dir) = testkit::service().await;
        let episode = tree.episodes[0].to_string();
        service
            .dispatch(
                "add",
                &params(&[("metadataId", &episode), ("start", "15000"), ("end", "45000"), ("type", "intro")]),
            )
            .await
            .unwrap();

        let shifted = service
            .dispatch("shift", &params(&[("id", &episode), ("shift", "-16000"), ("force", "0")]))
            .await
            .unwrap();
        assert_eq!(shifted["applied"], true);
        let markers = shifted["allMarkers"].as_array().unwrap();
        assert_eq!((markers[0]["start"].as_i64(), markers[0]["end"].as_i64()), (Some(0), Some(29_000)));
    }

    #[tokio::test]
    async fn test_enumeration_and_stats_shapes() {
        let (service, tree, _dir) = testkit::service().await;
        let sections = service.dispatch("get_sections", &Params::new()).await.unwrap();
        assert_eq!(sections.as_array().unwrap().len(), 3);

        let shows = service
            .dispatch("get_section", &params(&[("id", &tree.tv_section.to_string())]))
            .await
            .unwrap();
        assert_eq!(shows.as_array().unwrap().len(), 1);

        let episode = tree.episodes[0].to_string();
        service
            .dispatch(
                "add",
                &params(&[("metadataId", &episode), ("start", "0"), ("end", "1000"), ("type", "intro")]),
            )
            .await
            .unwrap();
        let stats = service
            .dispatch("get_stats", &params(&[("id", &tree.tv_section.to_string())]))
            .await
            .unwrap();
        assert_eq!(stats["totalIntros"], 1);
        assert_eq!(stats["items"], 3);
        assert_eq!(stats["buckets"]["1,0"], 1);
        assert_eq!(stats["buckets"]["0,0"], 2);
    }

    #[tokio::test]
    async fn test_suspend_and_resume_over_the_wire() {
        let (service, tree, _dir) = testkit::service().await;
        assert_eq!(service.dispatch("suspend", &Params::new()).await.unwrap()["ok"], true);

        let episode = tree.episodes[0].to_string();
        let err = service.dispatch("query", &params(&[("keys", &episode)])).await.unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::Unavailable));

        assert_eq!(service.dispatch("resume", &Params::new()).await.unwrap()["ok"], true);
        assert!(service.dispatch("query", &params(&[("keys", &episode)])).await.is_ok());
    }
}
