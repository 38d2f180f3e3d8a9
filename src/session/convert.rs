//! Fallible conversions between the wire messages and the domain model.
//!
//! Wire violations (no settings variant, several variants, unknown enum
//! values) surface as [`ConvertError`]; the session drops such events with a
//! counted reason instead of crashing.

use super::proto;
use crate::checks::model::{Check, CheckClass, Label};
use crate::checks::secret::Secret;
use crate::checks::settings::{
    Assertion, AssertionCondition, AssertionSubject, AssertionType, BasicAuth, BrowserSettings,
    CheckSettings, DnsProtocol, DnsRecordType, DnsSettings, GrpcSettings, HeaderMatch, HttpMethod,
    HttpSettings, IpVersion, MultiHttpEntry, MultiHttpRequest, MultiHttpSettings, PingSettings,
    ScriptedSettings, TcpQueryResponse, TcpSettings, TracerouteSettings, Variable, VariableType,
};
use crate::telemetry::{CheckClassTelemetry, RegionTelemetry};
use crate::tenant::{RemoteDatasource, SecretStore, Tenant};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConvertError {
    #[error("check settings missing")]
    MissingSettings,
    #[error("{0} settings variants set, exactly one expected")]
    AmbiguousSettings(usize),
    #[error("unknown value {value} for {field}")]
    UnknownEnum { field: &'static str, value: i32 },
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("missing field {0}")]
    MissingField(&'static str),
}

fn enum_value<P, D>(field: &'static str, value: i32, map: fn(P) -> D) -> Result<D, ConvertError>
where
    P: TryFrom<i32>,
{
    P::try_from(value)
        .map(map)
        .map_err(|_| ConvertError::UnknownEnum { field, value })
}

fn ip_version(value: i32) -> Result<IpVersion, ConvertError> {
    enum_value("ip_version", value, |v: proto::IpVersion| match v {
        proto::IpVersion::V4 => IpVersion::V4,
        proto::IpVersion::V6 => IpVersion::V6,
        proto::IpVersion::Any => IpVersion::Any,
    })
}

fn http_method(value: i32) -> Result<HttpMethod, ConvertError> {
    enum_value("method", value, |v: proto::HttpMethod| match v {
        proto::HttpMethod::Get => HttpMethod::Get,
        proto::HttpMethod::Head => HttpMethod::Head,
        proto::HttpMethod::Post => HttpMethod::Post,
        proto::HttpMethod::Put => HttpMethod::Put,
        proto::HttpMethod::Delete => HttpMethod::Delete,
        proto::HttpMethod::Options => HttpMethod::Options,
        proto::HttpMethod::Patch => HttpMethod::Patch,
    })
}

impl From<proto::Label> for Label {
    fn from(label: proto::Label) -> Self {
        Label {
            name: label.name,
            value: label.value,
        }
    }
}

impl From<Label> for proto::Label {
    fn from(label: Label) -> Self {
        proto::Label {
            name: label.name,
            value: label.value,
        }
    }
}

impl From<proto::HeaderMatch> for HeaderMatch {
    fn from(m: proto::HeaderMatch) -> Self {
        HeaderMatch {
            header: m.header,
            regexp: m.regexp,
            allow_missing: m.allow_missing,
        }
    }
}

impl TryFrom<proto::DnsSettings> for DnsSettings {
    type Error = ConvertError;

    fn try_from(settings: proto::DnsSettings) -> Result<Self, Self::Error> {
        let port = u16::try_from(settings.port).map_err(|_| ConvertError::OutOfRange {
            field: "dns port",
            value: i64::from(settings.port),
        })?;
        Ok(DnsSettings {
            record_type: enum_value(
                "record_type",
                settings.record_type,
                |v: proto::DnsRecordType| match v {
                    proto::DnsRecordType::A => DnsRecordType::A,
                    proto::DnsRecordType::Aaaa => DnsRecordType::Aaaa,
                    proto::DnsRecordType::Cname => DnsRecordType::Cname,
                    proto::DnsRecordType::Mx => DnsRecordType::Mx,
                    proto::DnsRecordType::Ns => DnsRecordType::Ns,
                    proto::DnsRecordType::Ptr => DnsRecordType::Ptr,
                    proto::DnsRecordType::Soa => DnsRecordType::Soa,
                    proto::DnsRecordType::Srv => DnsRecordType::Srv,
                    proto::DnsRecordType::Txt => DnsRecordType::Txt,
                },
            )?,
            protocol: enum_value("protocol", settings.protocol, |v: proto::DnsProtocol| {
                match v {
                    proto::DnsProtocol::Udp => DnsProtocol::Udp,
                    proto::DnsProtocol::Tcp => DnsProtocol::Tcp,
                }
            })?,
            ip_version: ip_version(settings.ip_version)?,
            port,
            valid_r_codes: settings.valid_r_codes,
        })
    }
}

impl TryFrom<proto::HttpSettings> for HttpSettings {
    type Error = ConvertError;

    fn try_from(settings: proto::HttpSettings) -> Result<Self, Self::Error> {
        let mut valid_status_codes = Vec::with_capacity(settings.valid_status_codes.len());
        for code in settings.valid_status_codes {
            valid_status_codes.push(u16::try_from(code).map_err(|_| ConvertError::OutOfRange {
                field: "valid_status_codes",
                value: i64::from(code),
            })?);
        }
        Ok(HttpSettings {
            method: http_method(settings.method)?,
            headers: settings.headers,
            body: settings.body,
            ip_version: ip_version(settings.ip_version)?,
            fail_if_ssl: settings.fail_if_ssl,
            fail_if_not_ssl: settings.fail_if_not_ssl,
            valid_status_codes,
            valid_http_versions: settings.valid_http_versions,
            fail_if_body_matches_regexp: settings.fail_if_body_matches_regexp,
            fail_if_body_not_matches_regexp: settings.fail_if_body_not_matches_regexp,
            fail_if_header_matches_regexp: settings
                .fail_if_header_matches_regexp
                .into_iter()
                .map(HeaderMatch::from)
                .collect(),
            fail_if_header_not_matches_regexp: settings
                .fail_if_header_not_matches_regexp
                .into_iter()
                .map(HeaderMatch::from)
                .collect(),
            basic_auth: settings.basic_auth.map(|auth| BasicAuth {
                username: auth.username,
                password: Secret::new(auth.password),
            }),
            bearer_token: Secret::new(settings.bearer_token),
            cache_busting_query_param_name: settings.cache_busting_query_param_name,
        })
    }
}

impl TryFrom<proto::Assertion> for Assertion {
    type Error = ConvertError;

    fn try_from(assertion: proto::Assertion) -> Result<Self, Self::Error> {
        let condition = assertion
            .condition
            .map(|value| {
                enum_value(
                    "assertion condition",
                    value,
                    |v: proto::AssertionCondition| match v {
                        proto::AssertionCondition::Contains => AssertionCondition::Contains,
                        proto::AssertionCondition::NotContains => AssertionCondition::NotContains,
                        proto::AssertionCondition::Equals => AssertionCondition::Equals,
                        proto::AssertionCondition::StartsWith => AssertionCondition::StartsWith,
                        proto::AssertionCondition::EndsWith => AssertionCondition::EndsWith,
                    },
                )
            })
            .transpose()?;
        let subject = assertion
            .subject
            .map(|value| {
                enum_value(
                    "assertion subject",
                    value,
                    |v: proto::AssertionSubject| match v {
                        proto::AssertionSubject::ResponseBody => AssertionSubject::ResponseBody,
                        proto::AssertionSubject::ResponseHeaders => {
                            AssertionSubject::ResponseHeaders
                        }
                        proto::AssertionSubject::HttpStatusCode => AssertionSubject::HttpStatusCode,
                    },
                )
            })
            .transpose()?;
        Ok(Assertion {
            kind: enum_value("assertion type", assertion.kind, |v: proto::AssertionType| {
                match v {
                    proto::AssertionType::Text => AssertionType::Text,
                    proto::AssertionType::JsonPathValue => AssertionType::JsonPathValue,
                    proto::AssertionType::JsonPathAssertion => AssertionType::JsonPathAssertion,
                    proto::AssertionType::Regex => AssertionType::Regex,
                }
            })?,
            condition,
            subject,
            expression: assertion.expression,
            value: assertion.value,
        })
    }
}

impl TryFrom<proto::MultiHttpEntry> for MultiHttpEntry {
    type Error = ConvertError;

    fn try_from(entry: proto::MultiHttpEntry) -> Result<Self, Self::Error> {
        let request = entry
            .request
            .ok_or(ConvertError::MissingField("multihttp entry request"))?;
        Ok(MultiHttpEntry {
            request: MultiHttpRequest {
                method: http_method(request.method)?,
                url: request.url,
                headers: request.headers.into_iter().map(Label::from).collect(),
                query_fields: request.query_fields.into_iter().map(Label::from).collect(),
                body: request.body,
            },
            assertions: entry
                .assertions
                .into_iter()
                .map(Assertion::try_from)
                .collect::<Result<_, _>>()?,
            variables: entry
                .variables
                .into_iter()
                .map(|variable| {
                    Ok(Variable {
                        kind: enum_value(
                            "variable type",
                            variable.kind,
                            |v: proto::VariableType| match v {
                                proto::VariableType::JsonPath => VariableType::JsonPath,
                                proto::VariableType::Regex => VariableType::Regex,
                                proto::VariableType::CssSelector => VariableType::CssSelector,
                            },
                        )?,
                        name: variable.name,
                        expression: variable.expression,
                    })
                })
                .collect::<Result<_, ConvertError>>()?,
        })
    }
}

impl TryFrom<proto::CheckSettings> for CheckSettings {
    type Error = ConvertError;

    fn try_from(settings: proto::CheckSettings) -> Result<Self, Self::Error> {
        let set = usize::from(settings.ping.is_some())
            + usize::from(settings.dns.is_some())
            + usize::from(settings.http.is_some())
            + usize::from(settings.tcp.is_some())
            + usize::from(settings.traceroute.is_some())
            + usize::from(settings.scripted.is_some())
            + usize::from(settings.multi_http.is_some())
            + usize::from(settings.grpc.is_some())
            + usize::from(settings.browser.is_some());
        if set == 0 {
            return Err(ConvertError::MissingSettings);
        }
        if set > 1 {
            return Err(ConvertError::AmbiguousSettings(set));
        }

        if let Some(ping) = settings.ping {
            return Ok(CheckSettings::Ping(PingSettings {
                ip_version: ip_version(ping.ip_version)?,
                payload_size: ping.payload_size,
                dont_fragment: ping.dont_fragment,
            }));
        }
        if let Some(dns) = settings.dns {
            return Ok(CheckSettings::Dns(dns.try_into()?));
        }
        if let Some(http) = settings.http {
            return Ok(CheckSettings::Http(http.try_into()?));
        }
        if let Some(tcp) = settings.tcp {
            return Ok(CheckSettings::Tcp(TcpSettings {
                ip_version: ip_version(tcp.ip_version)?,
                tls: tcp.tls,
                query_response: tcp
                    .query_response
                    .into_iter()
                    .map(|qr| TcpQueryResponse {
                        send: qr.send,
                        expect: qr.expect,
                        start_tls: qr.start_tls,
                    })
                    .collect(),
            }));
        }
        if let Some(traceroute) = settings.traceroute {
            return Ok(CheckSettings::Traceroute(TracerouteSettings {
                max_hops: traceroute.max_hops,
                max_unknown_hops: traceroute.max_unknown_hops,
                ptr_lookup: traceroute.ptr_lookup,
            }));
        }
        if let Some(scripted) = settings.scripted {
            return Ok(CheckSettings::Scripted(ScriptedSettings {
                script: scripted.script,
            }));
        }
        if let Some(multi_http) = settings.multi_http {
            return Ok(CheckSettings::MultiHttp(MultiHttpSettings {
                entries: multi_http
                    .entries
                    .into_iter()
                    .map(MultiHttpEntry::try_from)
                    .collect::<Result<_, _>>()?,
            }));
        }
        if let Some(grpc) = settings.grpc {
            return Ok(CheckSettings::Grpc(GrpcSettings {
                service: grpc.service,
                ip_version: ip_version(grpc.ip_version)?,
                tls: grpc.tls,
            }));
        }
        let browser = settings.browser.expect("one variant must be set");
        Ok(CheckSettings::Browser(BrowserSettings {
            script: browser.script,
        }))
    }
}

impl TryFrom<proto::Check> for Check {
    type Error = ConvertError;

    fn try_from(check: proto::Check) -> Result<Self, Self::Error> {
        let settings = check.settings.ok_or(ConvertError::MissingSettings)?;
        Ok(Check {
            id: check.id,
            tenant_id: check.tenant_id,
            frequency: check.frequency,
            offset: check.offset,
            timeout: check.timeout,
            probes: check.probes,
            target: check.target,
            job: check.job,
            labels: check.labels.into_iter().map(Label::from).collect(),
            settings: settings.try_into()?,
            modified: check.modified,
        })
    }
}

impl From<proto::RemoteDatasource> for RemoteDatasource {
    fn from(remote: proto::RemoteDatasource) -> Self {
        RemoteDatasource {
            name: remote.name,
            url: remote.url,
            username: remote.username,
            password: Secret::new(remote.password),
        }
    }
}

impl From<proto::Tenant> for Tenant {
    fn from(tenant: proto::Tenant) -> Self {
        Tenant {
            id: tenant.id,
            metrics_remote: tenant.metrics_remote.map(RemoteDatasource::from),
            logs_remote: tenant.logs_remote.map(RemoteDatasource::from),
            secret_store: tenant.secret_store.map(|store| SecretStore {
                url: store.url,
                token: Secret::new(store.token),
                expiry: (store.expiry != 0.0).then_some(store.expiry),
            }),
            omit_label_prefix: tenant.omit_label_prefix,
            modified: tenant.modified,
        }
    }
}

impl From<CheckClass> for proto::CheckClass {
    fn from(class: CheckClass) -> Self {
        match class {
            CheckClass::Protocol => proto::CheckClass::Protocol,
            CheckClass::Scripted => proto::CheckClass::Scripted,
            CheckClass::Browser => proto::CheckClass::Browser,
        }
    }
}

impl From<CheckClassTelemetry> for proto::CheckClassTelemetry {
    fn from(telemetry: CheckClassTelemetry) -> Self {
        proto::CheckClassTelemetry {
            local_tenant_id: telemetry.local_tenant_id,
            check_class: proto::CheckClass::from(telemetry.check_class) as i32,
            executions: telemetry.executions,
            duration_seconds: telemetry.duration_seconds,
            sampled_executions: telemetry.sampled_executions,
            cost_attribution: telemetry
                .cost_attribution
                .into_iter()
                .map(proto::Label::from)
                .collect(),
        }
    }
}

impl From<RegionTelemetry> for proto::RegionTelemetry {
    fn from(telemetry: RegionTelemetry) -> Self {
        proto::RegionTelemetry {
            region_id: telemetry.region_id,
            telemetry: telemetry
                .telemetry
                .into_iter()
                .map(proto::CheckClassTelemetry::from)
                .collect(),
        }
    }
}
