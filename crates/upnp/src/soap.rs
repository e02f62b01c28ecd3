/// ContentDirectory Browse SOAP envelope and response handling

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::BrowseError;

pub const CONTENT_DIRECTORY_SERVICE: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";

/// Children requested per Browse call; larger containers are truncated
pub const REQUESTED_COUNT: u32 = 1000;

/// `SOAPAction` header value for Browse (quotes included)
pub fn browse_soap_action() -> String {
    format!("\"{}#Browse\"", CONTENT_DIRECTORY_SERVICE)
}

/// Build a `BrowseDirectChildren` request for `object_id`
pub fn build_browse_envelope(object_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"
            s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:Browse xmlns:u="{}">
      <ObjectID>{}</ObjectID>
      <BrowseFlag>BrowseDirectChildren</BrowseFlag>
      <Filter>*</Filter>
      <StartingIndex>0</StartingIndex>
      <RequestedCount>{}</RequestedCount>
      <SortCriteria></SortCriteria>
    </u:Browse>
  </s:Body>
</s:Envelope>"#,
        CONTENT_DIRECTORY_SERVICE,
        escape_xml(object_id),
        REQUESTED_COUNT
    )
}

/// Decoded body of a successful Browse response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseResponse {
    /// DIDL-Lite document carried in `Result`
    pub didl: String,
    pub number_returned: Option<u32>,
    pub total_matches: Option<u32>,
}

/// Decode a Browse response body.
///
/// A SOAP Fault anywhere in the body is an error even when the HTTP status
/// was 200.
pub fn parse_browse_response(xml: &str) -> Result<BrowseResponse, BrowseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_fault = false;
    let mut fault_code = String::new();
    let mut fault_description = String::new();
    let mut current_text = String::new();

    let mut didl: Option<String> = None;
    let mut number_returned = None;
    let mut total_matches = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"Fault" {
                    in_fault = true;
                }
                current_text.clear();
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Result" {
                    didl.get_or_insert_with(String::new);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(BrowseError::xml)?;
                current_text.push_str(&text);
            }
            Ok(Event::CData(e)) => {
                current_text.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let text = current_text.trim();

                if in_fault {
                    match name.as_str() {
                        "errorCode" => fault_code = text.to_string(),
                        "faultstring" if fault_code.is_empty() => fault_code = text.to_string(),
                        "errorDescription" => fault_description = text.to_string(),
                        _ => {}
                    }
                } else {
                    match name.as_str() {
                        "Result" => didl = Some(text.to_string()),
                        "NumberReturned" => number_returned = text.parse().ok(),
                        "TotalMatches" => total_matches = text.parse().ok(),
                        _ => {}
                    }
                }

                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(BrowseError::xml(e)),
            _ => {}
        }
    }

    if in_fault {
        return Err(BrowseError::SoapFault {
            code: fault_code,
            description: fault_description,
        });
    }

    let didl = didl.ok_or(BrowseError::MissingResult)?;

    Ok(BrowseResponse {
        didl,
        number_returned,
        total_matches,
    })
}

/// Escape XML special characters
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
