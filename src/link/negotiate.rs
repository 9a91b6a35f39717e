//! Handshake validation, free of any I/O.

use crate::core::header::{fields, Header, WILDCARD_MD5SUM};
use crate::error::{constants, LinkError, Result};
use crate::service::handle::{ServiceHandle, ServiceLookup};
use std::sync::Arc;

/// Outcome of an accepted handshake.
pub struct Negotiated {
    pub service: Arc<dyn ServiceHandle>,
    /// Header to send back to the peer
    pub reply: Header,
    pub callerid: String,
    /// Peer only wants the reply header, not a request loop
    pub probe: bool,
}

impl std::fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiated")
            .field("service", &self.service.name())
            .field("reply", &self.reply)
            .field("callerid", &self.callerid)
            .field("probe", &self.probe)
            .finish()
    }
}

/// Decide whether `header` may call a service from `directory`.
///
/// Checks run in a fixed order: required fields, lookup, checksum, then
/// withdrawal. A service can be withdrawn between `lookup` returning it and
/// the last check.
pub fn negotiate(
    header: &Header,
    directory: &dyn ServiceLookup,
    node_name: &str,
) -> Result<Negotiated> {
    let (Some(md5sum), Some(service_name), Some(callerid)) = (
        header.get(fields::MD5SUM),
        header.get(fields::SERVICE),
        header.get(fields::CALLERID),
    ) else {
        return Err(LinkError::MalformedHeader(
            constants::ERR_MISSING_FIELDS.to_string(),
        ));
    };

    let service = directory
        .lookup(service_name)
        .ok_or_else(|| LinkError::ServiceNotFound(service_name.to_string()))?;

    if !checksums_match(md5sum, service.md5sum()) {
        return Err(LinkError::ChecksumMismatch {
            service: service_name.to_string(),
            requested: md5sum.to_string(),
            actual: service.md5sum().to_string(),
        });
    }

    if service.is_withdrawn() {
        return Err(LinkError::ServiceWithdrawn(service_name.to_string()));
    }

    let reply = Header::new()
        .with(fields::REQUEST_TYPE, service.request_type())
        .with(fields::RESPONSE_TYPE, service.response_type())
        .with(fields::TYPE, service.request_type())
        .with(fields::MD5SUM, service.md5sum())
        .with(fields::CALLERID, node_name);

    Ok(Negotiated {
        service,
        reply,
        callerid: callerid.to_string(),
        probe: header.get(fields::PROBE) == Some("1"),
    })
}

/// A wildcard on either side accepts any counterpart.
pub(crate) fn checksums_match(requested: &str, actual: &str) -> bool {
    requested == actual || requested == WILDCARD_MD5SUM || actual == WILDCARD_MD5SUM
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Service, ServiceDirectory, ServiceType};

    fn directory(md5sum: &str) -> ServiceDirectory {
        let directory = ServiceDirectory::new();
        directory
            .advertise(Service::from_fn(
                "add_two_ints",
                ServiceType::new(md5sum, "AddTwoIntsRequest", "AddTwoIntsResponse"),
                |_| None,
            ))
            .unwrap();
        directory
    }

    fn request(md5sum: &str) -> Header {
        Header::new()
            .with("md5sum", md5sum)
            .with("service", "add_two_ints")
            .with("callerid", "/peer1")
    }

    #[test]
    fn test_checksum_rule() {
        assert!(checksums_match("abc", "abc"));
        assert!(checksums_match("*", "abc"));
        assert!(checksums_match("abc", "*"));
        assert!(checksums_match("*", "*"));
        assert!(!checksums_match("abc", "def"));
        assert!(!checksums_match("", "abc"));
    }

    #[test]
    fn test_reply_header() {
        let negotiated = negotiate(&request("abc"), &directory("abc"), "/server").unwrap();
        let reply = &negotiated.reply;
        assert_eq!(reply.len(), 5);
        assert_eq!(reply.get("request_type"), Some("AddTwoIntsRequest"));
        assert_eq!(reply.get("response_type"), Some("AddTwoIntsResponse"));
        assert_eq!(reply.get("type"), Some("AddTwoIntsRequest"));
        assert_eq!(reply.get("md5sum"), Some("abc"));
        assert_eq!(reply.get("callerid"), Some("/server"));
        assert_eq!(negotiated.callerid, "/peer1");
        assert!(!negotiated.probe);
    }

    #[test]
    fn test_wildcard_reply_carries_provider_checksum() {
        let negotiated = negotiate(&request("*"), &directory("abc"), "/server").unwrap();
        assert_eq!(negotiated.reply.get("md5sum"), Some("abc"));
    }

    #[test]
    fn test_each_required_field() {
        for missing in ["md5sum", "service", "callerid"] {
            let header: Header = request("abc").iter().filter(|(k, _)| *k != missing).collect();
            let err = negotiate(&header, &directory("abc"), "/server").unwrap_err();
            assert!(
                matches!(err, LinkError::MalformedHeader(_)),
                "missing {missing} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_unknown_service() {
        let header = request("abc").with("service", "nope");
        assert!(matches!(
            negotiate(&header, &directory("abc"), "/server"),
            Err(LinkError::ServiceNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_mismatch_reports_both_checksums() {
        let err = negotiate(&request("abc"), &directory("def"), "/server").unwrap_err();
        assert_eq!(
            err.to_string(),
            "client wants service add_two_ints to have md5sum abc, but it has def. Dropping connection."
        );
    }

    /// Hands out its service, then withdraws it before the caller can use it.
    struct WithdrawAfterLookup(Arc<Service>);

    impl ServiceLookup for WithdrawAfterLookup {
        fn lookup(&self, _name: &str) -> Option<Arc<dyn ServiceHandle>> {
            let found = self.0.clone();
            self.0.withdraw();
            Some(found as Arc<dyn ServiceHandle>)
        }
    }

    #[test]
    fn test_withdrawal_after_lookup() {
        let service = Arc::new(Service::from_fn(
            "add_two_ints",
            ServiceType::new("abc", "AddTwoIntsRequest", "AddTwoIntsResponse"),
            |_| None,
        ));
        assert!(!service.is_withdrawn());

        let lookup = WithdrawAfterLookup(service);
        assert!(matches!(
            negotiate(&request("abc"), &lookup, "/server"),
            Err(LinkError::ServiceWithdrawn(name)) if name == "add_two_ints"
        ));
    }

    #[test]
    fn test_probe_flag() {
        let header = request("*").with("probe", "1");
        assert!(negotiate(&header, &directory("abc"), "/server").unwrap().probe);
    }
}
