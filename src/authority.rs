//! Hickory DNS authority that answers address queries from the selector.
//!
//! Only queries whose first label equals the configured hostname (and whose
//! remaining labels equal the configured domain, when one is set) are
//! answered from the backend pool. Anything else under the zone is
//! NXDomain; this server is authoritative and has no fallthrough chain.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, SOA};
use hickory_proto::rr::{LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::{LbConfig, SoaConfig};
use crate::error::LbError;
use crate::metrics::{self, QueryResult, Timer};
use crate::select::Selector;

/// Authority answering `<hostname>.<domain>` A queries from live telemetry.
pub struct SessionAuthority {
    origin: LowerName,
    hostname: String,
    domain: String,
    ttl: u32,
    soa: SoaConfig,
    selector: Selector,
}

/// Split a query name into its first label and the remainder.
fn split_fqdn(fqdn: &str) -> (&str, &str) {
    let fqdn = fqdn.trim_end_matches('.');
    match fqdn.split_once('.') {
        Some((hostname, domain)) => (hostname, domain),
        None => (fqdn, ""),
    }
}

impl SessionAuthority {
    /// Create a new authority for the given configuration and selector.
    pub fn new(config: &LbConfig, selector: Selector) -> Result<Self, LbError> {
        let domain = config.domain.to_ascii_lowercase();
        let origin: LowerName = if domain.is_empty() {
            Name::root().into()
        } else {
            Name::from_ascii(&domain)?.into()
        };

        Ok(Self {
            origin,
            hostname: config.hostname.to_ascii_lowercase(),
            domain,
            ttl: config.ttl,
            soa: config.soa.clone(),
            selector,
        })
    }

    /// Whether a query name is the one this balancer serves.
    fn matches(&self, name: &LowerName) -> bool {
        let name_str = name.to_string();
        let (hostname, domain) = split_fqdn(&name_str);
        hostname == self.hostname && (self.domain.is_empty() || domain == self.domain)
    }

    /// Build A records for the given name and addresses, preserving order.
    /// Non-IPv4 pool entries are skipped.
    fn build_a_records(&self, name: Name, addrs: &[IpAddr]) -> RecordSet {
        let mut record_set = RecordSet::new(name.clone(), RecordType::A, 0);

        let v4: Vec<Ipv4Addr> = addrs
            .iter()
            .filter_map(|addr| match addr {
                IpAddr::V4(v4) => Some(*v4),
                IpAddr::V6(_) => None,
            })
            .collect();

        for ip in v4 {
            let mut record =
                Record::from_rdata(name.clone(), self.ttl, RData::A(A::from(ip)));
            record.set_dns_class(hickory_proto::rr::DNSClass::IN);
            record_set.insert(record, 0);
        }

        record_set
    }

    /// Build the SOA record for this zone.
    fn build_soa_record(&self) -> RecordSet {
        let soa = SOA::new(
            Name::from_ascii(&self.soa.mname).unwrap_or_else(|_| Name::root()),
            Name::from_ascii(&self.soa.rname).unwrap_or_else(|_| Name::root()),
            0,
            self.soa.refresh as i32,
            self.soa.retry as i32,
            self.soa.expire as i32,
            self.soa.minimum,
        );

        let name = Name::from(self.origin.clone());
        let mut record_set = RecordSet::new(name.clone(), RecordType::SOA, 0);
        let mut record = Record::from_rdata(name, self.ttl, RData::SOA(soa));
        record.set_dns_class(hickory_proto::rr::DNSClass::IN);
        record_set.insert(record, 0);

        record_set
    }

    /// Build an NS record for this zone.
    fn build_ns_record(&self) -> RecordSet {
        let name = Name::from(self.origin.clone());
        let ns_name = Name::from_ascii(&self.soa.mname).unwrap_or_else(|_| Name::root());

        let mut record_set = RecordSet::new(name.clone(), RecordType::NS, 0);
        let mut record = Record::from_rdata(
            name,
            self.ttl,
            RData::NS(hickory_proto::rr::rdata::NS(ns_name)),
        );
        record.set_dns_class(hickory_proto::rr::DNSClass::IN);
        record_set.insert(record, 0);

        record_set
    }
}

#[async_trait]
impl Authority for SessionAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let timer = Timer::start();
        let rtype_str = format!("{:?}", rtype);

        trace!(name = %name, rtype = ?rtype, "DNS lookup");

        match rtype {
            RecordType::A => {
                if !self.matches(name) {
                    debug!(name = %name, "A lookup: hostname/domain mismatch");
                    metrics::record_query(&rtype_str, QueryResult::NxDomain, timer.elapsed());
                    return LookupControlFlow::Break(Err(LookupError::ResponseCode(
                        ResponseCode::NXDomain,
                    )));
                }

                let addrs = self.selector.addresses();
                debug!(name = %name, count = addrs.len(), "A lookup: answering from pool");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                let dns_name = Name::from(name.clone());
                let record_set = Arc::new(self.build_a_records(dns_name, &addrs));
                LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
            }
            RecordType::SOA => {
                debug!(name = %name, "SOA lookup");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                let record_set = Arc::new(self.build_soa_record());
                LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
            }
            RecordType::NS => {
                debug!(name = %name, "NS lookup");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                let record_set = Arc::new(self.build_ns_record());
                LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
            }
            _ => {
                trace!(name = %name, rtype = ?rtype, "unsupported record type");
                metrics::record_query(&rtype_str, QueryResult::Unhandled, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
            }
        }
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}
