//! Parameter parsing for the dispatcher.
//!
//! One validated constructor per operation: integers, enumerated strings,
//! 0/1 booleans and comma-separated id lists all get checked here, so the
//! engine never sees a raw string. Anything that fails to parse is a
//! `BadRequest` naming the offending parameter.

use cuemark_engine::error::{ErrorKind, Result};
use cuemark_media::MarkerType;
use exn::{OptionExt, ResultExt};
use std::collections::{HashMap, HashSet};

/// The raw parameter map the transport hands over.
pub type Params = HashMap<String, String>;

fn required<'a>(params: &'a Params, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or_raise(|| ErrorKind::BadRequest(format!("missing parameter '{key}'")))
}

fn int(params: &Params, key: &str) -> Result<i64> {
    required(params, key)?
        .trim()
        .parse::<i64>()
        .or_raise(|| ErrorKind::BadRequest(format!("parameter '{key}' must be an integer")))
}

fn opt_int(params: &Params, key: &str) -> Result<Option<i64>> {
    match params.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .or_raise(|| ErrorKind::BadRequest(format!("parameter '{key}' must be an integer"))),
        None => Ok(None),
    }
}

/// A 0/1 flag; anything else is a parse failure, not a truthiness guess.
fn flag(params: &Params, key: &str) -> Result<bool> {
    match int(params, key)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => exn::bail!(ErrorKind::BadRequest(format!("parameter '{key}' must be 0 or 1"))),
    }
}

fn opt_flag(params: &Params, key: &str, default: bool) -> Result<bool> {
    match params.contains_key(key) {
        true => flag(params, key),
        false => Ok(default),
    }
}

/// Optional comma-separated id list; absent means empty.
fn id_set(params: &Params, key: &str) -> Result<HashSet<i64>> {
    let Some(raw) = params.get(key) else {
        return Ok(HashSet::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .or_raise(|| ErrorKind::BadRequest(format!("parameter '{key}' must be a list of integers")))
        })
        .collect()
}

fn marker_type(params: &Params, key: &str) -> Result<MarkerType> {
    required(params, key)?
        .parse::<MarkerType>()
        .or_raise(|| ErrorKind::BadRequest(format!("parameter '{key}' must be intro, credits or commercial")))
}

/// `query`
pub(crate) struct QueryParams {
    pub(crate) keys: Vec<i64>,
}
impl QueryParams {
    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        let keys: Vec<i64> = id_set(params, "keys")?.into_iter().collect();
        if keys.is_empty() {
            exn::bail!(ErrorKind::BadRequest("parameter 'keys' must list at least one id".to_string()));
        }
        Ok(Self { keys })
    }
}

/// `add`
#[derive(Debug)]
pub(crate) struct AddParams {
    pub(crate) metadata_id: i64,
    pub(crate) start: i64,
    pub(crate) end: i64,
    pub(crate) kind: MarkerType,
    pub(crate) is_final: bool,
}
impl AddParams {
    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            metadata_id: int(params, "metadataId")?,
            start: int(params, "start")?,
            end: int(params, "end")?,
            kind: marker_type(params, "type")?,
            is_final: opt_flag(params, "final", false)?,
        })
    }
}

/// `edit`
pub(crate) struct EditParams {
    pub(crate) id: i64,
    pub(crate) start: i64,
    pub(crate) end: i64,
    pub(crate) kind: MarkerType,
    pub(crate) is_final: bool,
    pub(crate) user_created: bool,
}
impl EditParams {
    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            id: int(params, "id")?,
            start: int(params, "start")?,
            end: int(params, "end")?,
            kind: marker_type(params, "type")?,
            is_final: opt_flag(params, "final", false)?,
            user_created: opt_flag(params, "userCreated", true)?,
        })
    }
}

/// Every operation addressed by a single `id`.
pub(crate) struct IdParams {
    pub(crate) id: i64,
}
impl IdParams {
    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        Ok(Self { id: int(params, "id")? })
    }
}

/// `shift` — deltas come either as one `shift` applied to both endpoints
/// or as a `startShift`/`endShift` pair.
#[derive(Debug)]
pub(crate) struct ShiftParams {
    pub(crate) id: i64,
    pub(crate) d_start: i64,
    pub(crate) d_end: i64,
    pub(crate) force: bool,
    pub(crate) ignored: HashSet<i64>,
}
impl ShiftParams {
    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        let id = int(params, "id")?;
        let (d_start, d_end) = match opt_int(params, "shift")? {
            Some(delta) => (delta, delta),
            None => {
                let d_start = opt_int(params, "startShift")?;
                let d_end = opt_int(params, "endShift")?;
                if d_start.is_none() && d_end.is_none() {
                    exn::bail!(ErrorKind::BadRequest(
                        "provide 'shift', or 'startShift' and/or 'endShift'".to_string()
                    ));
                }
                (d_start.unwrap_or(0), d_end.unwrap_or(0))
            },
        };
        Ok(Self {
            id,
            d_start,
            d_end,
            force: opt_flag(params, "force", false)?,
            ignored: id_set(params, "ignored")?,
        })
    }
}

/// `restore` / `ignore_purge`
pub(crate) struct PurgeTargetParams {
    pub(crate) marker_id: i64,
    pub(crate) section_id: i64,
}
impl PurgeTargetParams {
    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        Ok(Self { marker_id: int(params, "markerId")?, section_id: int(params, "sectionId")? })
    }
}

/// `all_purges`
pub(crate) struct SectionParams {
    pub(crate) section_id: i64,
}
impl SectionParams {
    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        Ok(Self { section_id: int(params, "sectionId")? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_add_params_happy_path() {
        let p = AddParams::from_params(&params(&[
            ("metadataId", "1000"),
            ("start", "0"),
            ("end", "30000"),
            ("type", "intro"),
            ("final", "0"),
        ]))
        .unwrap();
        assert_eq!((p.metadata_id, p.start, p.end), (1000, 0, 30_000));
        assert_eq!(p.kind, MarkerType::Intro);
        assert!(!p.is_final);
    }

    #[rstest]
    #[case(&[("start", "0"), ("end", "1"), ("type", "intro")])] // missing metadataId
    #[case(&[("metadataId", "x"), ("start", "0"), ("end", "1"), ("type", "intro")])]
    #[case(&[("metadataId", "1"), ("start", "0"), ("end", "1"), ("type", "outro")])]
    #[case(&[("metadataId", "1"), ("start", "0"), ("end", "1"), ("type", "intro"), ("final", "2")])]
    fn test_add_params_rejects(#[case] pairs: &[(&str, &str)]) {
        let err = AddParams::from_params(&params(pairs)).unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::BadRequest(_)));
    }

    #[test]
    fn test_query_params_parse_csv() {
        let p = QueryParams::from_params(&params(&[("keys", "1, 2,3")])).unwrap();
        let mut keys = p.keys;
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2, 3]);
        assert!(QueryParams::from_params(&params(&[("keys", "")])).is_err());
    }

    #[test]
    fn test_shift_params_single_delta() {
        let p = ShiftParams::from_params(&params(&[("id", "10"), ("shift", "-16000")])).unwrap();
        assert_eq!((p.d_start, p.d_end), (-16_000, -16_000));
        assert!(!p.force);
        assert!(p.ignored.is_empty());
    }

    #[test]
    fn test_shift_params_split_deltas_and_ignore_list() {
        let p = ShiftParams::from_params(&params(&[
            ("id", "10"),
            ("startShift", "0"),
            ("endShift", "5000"),
            ("force", "1"),
            ("ignored", "7,9"),
        ]))
        .unwrap();
        assert_eq!((p.d_start, p.d_end), (0, 5_000));
        assert!(p.force);
        assert_eq!(p.ignored, HashSet::from([7, 9]));
    }

    #[test]
    fn test_shift_params_require_some_delta() {
        let err = ShiftParams::from_params(&params(&[("id", "10")])).unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::BadRequest(_)));
    }
}
