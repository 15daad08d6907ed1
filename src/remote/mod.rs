//! # Remote Calls
//!
//! Everything the client knows about the remote system goes through the
//! [`RemoteCaller`] trait: send one request element plus query parameters,
//! get one response element back. The trait is the only seam between the
//! object graph and the network, which lets tests substitute the in-memory
//! [`MemoryDirectory`] for a live server.
//!
//! ## Request vocabulary
//!
//! Requests are elements named after the remote method, in one of the
//! namespaces below. Responses are `<{Method}Response>` elements whose
//! payload is a list of `<tuple>` children:
//!
//! | Method | Payload |
//! |---|---|
//! | `GetInstallationInfo` | `tuple/old/installation{ldaproot,version,build,os}` |
//! | `GetUserDetails` | `tuple/old/user{authuserdn}` |
//! | `GetLDAPObject{dn}` | `tuple/old/entry` (no tuple when absent) |
//! | `GetChildren{dn,filter,sort}` | one `tuple/old/entry` per child |
//! | `SearchLDAP{dn,scope,filter,sort}` | one `tuple/old/entry` per match |
//! | `Update{tuple{old?,new?}}` | echo of the tuple |
//! | `GetXMLObject{key}` | `tuple[key,name,version]/old/<content>` |
//! | `GetCollection{folder}` | one `tuple[key,name]` per object |
//! | `UpdateXMLObject{tuple{new|old}}` | echo of the tuple |
//! | `Start`/`Stop`/`Restart{dn}` | status |
//! | `List` | `tuple/old/workerprocess{name,status}` per container |
//! | `UploadISVPackage`/`LoadISVPackage`/`UnloadISVPackage` | status |
//! | `DeployCAP`/`UnDeployCAP` | status |

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::xml::{self, XmlNode};

pub mod http;
pub mod memory;
pub mod soap;

pub use http::HttpCaller;
pub use memory::{CallRecord, MemoryDirectory};

/// Query parameters sent along with a request.
///
/// Keys in use: `receiver` (target DN), `organization` (organization DN
/// context) and `timeout` (milliseconds, interpreted by the server).
pub type QueryParams = BTreeMap<String, String>;

pub const LDAP_NAMESPACE: &str = "http://schemas.cordys.com/1.0/ldap";
pub const XMLSTORE_NAMESPACE: &str = "http://schemas.cordys.com/1.0/xmlstore";
pub const MONITOR_NAMESPACE: &str = "http://schemas.cordys.com/1.0/monitor";
pub const ISV_NAMESPACE: &str = "http://schemas.cordys.com/1.0/isvpackage";
pub const CAP_NAMESPACE: &str = "http://schemas.cordys.com/cap/1.0";

/// Transport for administrative requests.
pub trait RemoteCaller: Send + Sync {
    /// Execute one request and return the response element.
    fn call(&self, request: &XmlNode, params: &QueryParams) -> Result<XmlNode>;

    /// Execute a request given as raw XML text.
    fn call_text(&self, request: &str, params: &QueryParams) -> Result<String> {
        let request = xml::parse(request)?;
        self.call(&request, params)?.to_xml_string()
    }

    /// Short description of the endpoint, used in logs and errors.
    fn describe(&self) -> String;
}

/// Start a request element for `method` in `namespace`.
pub fn request(method: &str, namespace: &str) -> XmlNode {
    XmlNode::new(method).with_attr("xmlns", namespace)
}

/// Start the response element for `method`.
pub fn response(method: &str, namespace: &str) -> XmlNode {
    XmlNode::new(format!("{}Response", method)).with_attr("xmlns", namespace)
}

/// All `<tuple>` children of a response.
pub fn tuples(response: &XmlNode) -> impl Iterator<Item = &XmlNode> {
    response.children_named("tuple")
}

/// The element carried inside `tuple/old`.
pub fn old_payload(tuple: &XmlNode) -> Option<&XmlNode> {
    tuple.child("old").and_then(XmlNode::first_element)
}

/// The payload of the first tuple, or `NotFound` naming `key`.
pub fn single_payload<'a>(response: &'a XmlNode, key: &str) -> Result<&'a XmlNode> {
    tuples(response)
        .next()
        .and_then(old_payload)
        .ok_or_else(|| Error::NotFound {
            key: key.to_string(),
        })
}

/// Build query parameters from key/value pairs.
pub fn params<I, K, V>(pairs: I) -> QueryParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_namespace() {
        let node = request("GetLDAPObject", LDAP_NAMESPACE).with_text_child("dn", "o=system");
        assert_eq!(node.name(), "GetLDAPObject");
        assert_eq!(node.attr("xmlns"), Some(LDAP_NAMESPACE));
        assert_eq!(node.child_text("dn"), Some("o=system".to_string()));
    }

    #[test]
    fn test_single_payload_reports_missing_key() {
        let empty = response("GetLDAPObject", LDAP_NAMESPACE);
        let error = single_payload(&empty, "o=missing").unwrap_err();
        assert!(error.is_not_found());

        let full = response("GetLDAPObject", LDAP_NAMESPACE).with_child(
            XmlNode::new("tuple")
                .with_child(XmlNode::new("old").with_child(XmlNode::new("entry"))),
        );
        assert_eq!(single_payload(&full, "x").unwrap().name(), "entry");
    }

    #[test]
    fn test_params_from_pairs() {
        let params = params([("timeout", "1000"), ("organization", "o=system")]);
        assert_eq!(params.get("timeout").map(String::as_str), Some("1000"));
        assert_eq!(params.len(), 2);
    }
}
