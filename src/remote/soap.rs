//! SOAP envelope handling for the HTTP transport.

use crate::error::{Error, Result};
use crate::xml::XmlNode;

pub const ENVELOPE_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Wrap a request element in `SOAP:Envelope/SOAP:Body`.
pub fn envelope(request: &XmlNode) -> XmlNode {
    XmlNode::new("SOAP:Envelope")
        .with_attr("xmlns:SOAP", ENVELOPE_NAMESPACE)
        .with_child(XmlNode::new("SOAP:Body").with_child(request.clone()))
}

/// Extract the response element from an envelope.
///
/// A `Fault` body becomes `Error::RemoteFault` carrying the fault string.
pub fn unwrap(method: &str, document: &XmlNode) -> Result<XmlNode> {
    if document.local_name() != "Envelope" {
        return Err(Error::xml(format!(
            "expected SOAP envelope, found <{}>",
            document.name()
        )));
    }
    let body = document
        .child("Body")
        .ok_or_else(|| Error::xml("SOAP envelope without body"))?;
    let payload = body
        .first_element()
        .ok_or_else(|| Error::xml("empty SOAP body"))?;
    if payload.local_name() == "Fault" {
        return Err(Error::RemoteFault {
            method: method.to_string(),
            message: fault_message(payload),
        });
    }
    Ok(payload.clone())
}

/// Human readable text of a `Fault` element.
pub fn fault_message(fault: &XmlNode) -> String {
    let message = fault
        .child_text("faultstring")
        .filter(|text| !text.is_empty())
        .or_else(|| fault.path("detail/message").map(|node| node.text()))
        .unwrap_or_else(|| "unknown fault".to_string());
    match fault.child_text("faultcode") {
        Some(code) if !code.is_empty() => format!("{} ({})", message, code),
        _ => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    #[test]
    fn test_envelope_round_trip() {
        let request = XmlNode::new("GetUserDetails").with_attr("xmlns", "urn:ldap");
        let wrapped = envelope(&request);
        let text = wrapped.to_xml_string().unwrap();
        let parsed = xml::parse(&text).unwrap();
        assert_eq!(unwrap("GetUserDetails", &parsed).unwrap(), request);
    }

    #[test]
    fn test_fault_becomes_remote_fault() {
        let document = xml::parse(
            r#"<SOAP:Envelope xmlns:SOAP="http://schemas.xmlsoap.org/soap/envelope/">
                 <SOAP:Body>
                   <SOAP:Fault>
                     <faultcode>Server.Ldap</faultcode>
                     <faultstring>Entry already exists</faultstring>
                   </SOAP:Fault>
                 </SOAP:Body>
               </SOAP:Envelope>"#,
        )
        .unwrap();
        match unwrap("Update", &document) {
            Err(Error::RemoteFault { method, message }) => {
                assert_eq!(method, "Update");
                assert_eq!(message, "Entry already exists (Server.Ldap)");
            }
            other => panic!("expected remote fault, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_non_envelope() {
        let document = XmlNode::new("html");
        assert!(unwrap("List", &document).is_err());
    }
}
