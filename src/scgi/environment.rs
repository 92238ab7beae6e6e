use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use tracing::debug;
use super::defs;
use super::request::NameValuePair;
use crate::gateway_error::ExecutionError;

/// The variables handed to one script invocation.
///
/// Built from scratch for every request and passed to the child
/// explicitly, so nothing leaks between requests and the gateway's own
/// process environment is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment
{
    vars: BTreeMap<OsString, OsString>
}

impl Environment
{
    /// Insert the pairs in order (a repeated key keeps its last value),
    /// then the protocol marker. Fails if no script is named.
    pub fn build(pairs: &[NameValuePair]) -> Result<Environment, ExecutionError>
    {
        let mut vars = BTreeMap::new();
        for p in pairs {
            debug!("{}={}", p.name_os().to_string_lossy(),
                   p.value_os().to_string_lossy());
            vars.insert(p.name_os().to_os_string(), p.value_os().to_os_string());
        }
        vars.insert(OsString::from(defs::SCGI_MARKER),
                    OsString::from(defs::SCGI_MARKER_VALUE));
        if !vars.contains_key(OsStr::new(defs::SCRIPT_FILENAME)) {
            return Err(ExecutionError::PrimaryScriptUnknown);
        }
        Ok(Environment{vars})
    }

    pub fn get(&self, name: &str) -> Option<&OsStr>
    {
        self.vars.get(OsStr::new(name)).map(|v| v.as_os_str())
    }

    pub fn script_filename(&self) -> PathBuf
    {
        self.get(defs::SCRIPT_FILENAME)
            .map(PathBuf::from)
            .unwrap_or_default()
    }

    /// Size of the request body, if the client announced a non-empty one
    pub fn content_length(&self) -> Option<u64>
    {
        self.get(defs::CONTENT_LENGTH)
            .and_then(|s| s.to_str())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&l| l > 0)
    }

    pub fn len(&self) -> usize
    {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, OsString, OsString>
    {
        self.vars.iter()
    }
}

#[cfg(test)]
use bytes::Bytes;

#[cfg(test)]
fn pair(name: &'static str, value: &'static str) -> NameValuePair
{
    NameValuePair::new(Bytes::from_static(name.as_bytes()),
                       Bytes::from_static(value.as_bytes()))
}

#[test]
fn test_build_environment()
{
    let env = Environment::build(&[
        pair("CONTENT_LENGTH", "9"),
        pair("SCRIPT_FILENAME", "/usr/bin/true"),
    ]).unwrap();
    let vars: Vec<(&str, &str)> = env.iter()
        .map(|(k, v)| (k.to_str().unwrap(), v.to_str().unwrap()))
        .collect();
    assert_eq!(vars, vec![("CONTENT_LENGTH", "9"),
                          ("SCGI", "1"),
                          ("SCRIPT_FILENAME", "/usr/bin/true")]);
    assert_eq!(env.script_filename(), PathBuf::from("/usr/bin/true"));
    assert_eq!(env.content_length(), Some(9));
}

#[test]
fn test_last_write_wins()
{
    let env = Environment::build(&[
        pair("SCRIPT_FILENAME", "/a"),
        pair("X", "1"),
        pair("X", "2"),
        pair("SCRIPT_FILENAME", "/b"),
    ]).unwrap();
    assert_eq!(env.len(), 3);
    assert_eq!(env.get("X"), Some(OsStr::new("2")));
    assert_eq!(env.script_filename(), PathBuf::from("/b"));
}

#[test]
fn test_marker_not_overridable()
{
    let env = Environment::build(&[
        pair("SCGI", "0"),
        pair("SCRIPT_FILENAME", "/a"),
    ]).unwrap();
    assert_eq!(env.get("SCGI"), Some(OsStr::new("1")));
}

#[test]
fn test_missing_script()
{
    match Environment::build(&[pair("CONTENT_LENGTH", "0")]) {
        Err(ExecutionError::PrimaryScriptUnknown) => {},
        other => panic!("Unexpected result {:?}", other)
    }
}

#[test]
fn test_content_length()
{
    let env = Environment::build(&[pair("SCRIPT_FILENAME", "/a"),
                                   pair("CONTENT_LENGTH", "0")]).unwrap();
    assert_eq!(env.content_length(), None);
    let env = Environment::build(&[pair("SCRIPT_FILENAME", "/a"),
                                   pair("CONTENT_LENGTH", "x")]).unwrap();
    assert_eq!(env.content_length(), None);
    let env = Environment::build(&[pair("SCRIPT_FILENAME", "/a")]).unwrap();
    assert_eq!(env.content_length(), None);
}

#[test]
fn test_no_inherited_variables()
{
    let env = Environment::build(&[pair("SCRIPT_FILENAME", "/a")]).unwrap();
    assert_eq!(env.get("PATH"), None);
    assert_eq!(env.get("HOME"), None);
    assert_eq!(env.len(), 2);
}
