//! Hand-maintained protobuf message set for the control-plane RPC surface.
//!
//! This mirrors the wire contract the API serves; the field tags are the
//! compatibility-critical part and must not be renumbered. Kept as checked-in
//! prost types (rather than build-time codegen) so the wire surface is
//! reviewable like any other source file.

/// Empty request/response placeholder.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Void {}

/// Identity this probe announces when opening the change stream. The bearer
/// token travels in call metadata, not here.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IpVersion {
    V4 = 0,
    V6 = 1,
    Any = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DnsRecordType {
    A = 0,
    Aaaa = 1,
    Cname = 2,
    Mx = 3,
    Ns = 4,
    Ptr = 5,
    Soa = 6,
    Srv = 7,
    Txt = 8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DnsProtocol {
    Udp = 0,
    Tcp = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum HttpMethod {
    Get = 0,
    Head = 1,
    Post = 2,
    Put = 3,
    Delete = 4,
    Options = 5,
    Patch = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AssertionType {
    Text = 0,
    JsonPathValue = 1,
    JsonPathAssertion = 2,
    Regex = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AssertionCondition {
    Contains = 0,
    NotContains = 1,
    Equals = 2,
    StartsWith = 3,
    EndsWith = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AssertionSubject {
    ResponseBody = 0,
    ResponseHeaders = 1,
    HttpStatusCode = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum VariableType {
    JsonPath = 0,
    Regex = 1,
    CssSelector = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CheckClass {
    Protocol = 0,
    Scripted = 1,
    Browser = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PingSettings {
    #[prost(enumeration = "IpVersion", tag = "1")]
    pub ip_version: i32,
    #[prost(int64, tag = "2")]
    pub payload_size: i64,
    #[prost(bool, tag = "3")]
    pub dont_fragment: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DnsSettings {
    #[prost(enumeration = "DnsRecordType", tag = "1")]
    pub record_type: i32,
    #[prost(enumeration = "DnsProtocol", tag = "2")]
    pub protocol: i32,
    #[prost(enumeration = "IpVersion", tag = "3")]
    pub ip_version: i32,
    #[prost(uint32, tag = "4")]
    pub port: u32,
    #[prost(string, repeated, tag = "5")]
    pub valid_r_codes: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderMatch {
    #[prost(string, tag = "1")]
    pub header: String,
    #[prost(string, tag = "2")]
    pub regexp: String,
    #[prost(bool, tag = "3")]
    pub allow_missing: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BasicAuth {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpSettings {
    #[prost(enumeration = "HttpMethod", tag = "1")]
    pub method: i32,
    #[prost(string, repeated, tag = "2")]
    pub headers: Vec<String>,
    #[prost(string, tag = "3")]
    pub body: String,
    #[prost(enumeration = "IpVersion", tag = "4")]
    pub ip_version: i32,
    #[prost(bool, tag = "5")]
    pub fail_if_ssl: bool,
    #[prost(bool, tag = "6")]
    pub fail_if_not_ssl: bool,
    #[prost(uint32, repeated, tag = "7")]
    pub valid_status_codes: Vec<u32>,
    #[prost(string, repeated, tag = "8")]
    pub valid_http_versions: Vec<String>,
    #[prost(string, repeated, tag = "9")]
    pub fail_if_body_matches_regexp: Vec<String>,
    #[prost(string, repeated, tag = "10")]
    pub fail_if_body_not_matches_regexp: Vec<String>,
    #[prost(message, repeated, tag = "11")]
    pub fail_if_header_matches_regexp: Vec<HeaderMatch>,
    #[prost(message, repeated, tag = "12")]
    pub fail_if_header_not_matches_regexp: Vec<HeaderMatch>,
    #[prost(message, optional, tag = "13")]
    pub basic_auth: Option<BasicAuth>,
    #[prost(string, tag = "14")]
    pub bearer_token: String,
    #[prost(string, tag = "15")]
    pub cache_busting_query_param_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TcpQueryResponse {
    #[prost(string, tag = "1")]
    pub send: String,
    #[prost(string, tag = "2")]
    pub expect: String,
    #[prost(bool, tag = "3")]
    pub start_tls: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TcpSettings {
    #[prost(enumeration = "IpVersion", tag = "1")]
    pub ip_version: i32,
    #[prost(bool, tag = "2")]
    pub tls: bool,
    #[prost(message, repeated, tag = "3")]
    pub query_response: Vec<TcpQueryResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TracerouteSettings {
    #[prost(int64, tag = "1")]
    pub max_hops: i64,
    #[prost(int64, tag = "2")]
    pub max_unknown_hops: i64,
    #[prost(bool, tag = "3")]
    pub ptr_lookup: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScriptedSettings {
    #[prost(string, tag = "1")]
    pub script: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BrowserSettings {
    #[prost(string, tag = "1")]
    pub script: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GrpcSettings {
    #[prost(string, tag = "1")]
    pub service: String,
    #[prost(enumeration = "IpVersion", tag = "2")]
    pub ip_version: i32,
    #[prost(bool, tag = "3")]
    pub tls: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MultiHttpRequest {
    #[prost(enumeration = "HttpMethod", tag = "1")]
    pub method: i32,
    #[prost(string, tag = "2")]
    pub url: String,
    #[prost(message, repeated, tag = "3")]
    pub headers: Vec<Label>,
    #[prost(message, repeated, tag = "4")]
    pub query_fields: Vec<Label>,
    #[prost(string, tag = "5")]
    pub body: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Assertion {
    #[prost(enumeration = "AssertionType", tag = "1")]
    pub kind: i32,
    #[prost(enumeration = "AssertionCondition", optional, tag = "2")]
    pub condition: Option<i32>,
    #[prost(enumeration = "AssertionSubject", optional, tag = "3")]
    pub subject: Option<i32>,
    #[prost(string, optional, tag = "4")]
    pub expression: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Variable {
    #[prost(enumeration = "VariableType", tag = "1")]
    pub kind: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub expression: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MultiHttpEntry {
    #[prost(message, optional, tag = "1")]
    pub request: Option<MultiHttpRequest>,
    #[prost(message, repeated, tag = "2")]
    pub assertions: Vec<Assertion>,
    #[prost(message, repeated, tag = "3")]
    pub variables: Vec<Variable>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MultiHttpSettings {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<MultiHttpEntry>,
}

/// The sum-typed settings: exactly one sub-message is set; the check type is
/// derived from which one. Enforced at conversion time, not by the codec.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckSettings {
    #[prost(message, optional, tag = "1")]
    pub ping: Option<PingSettings>,
    #[prost(message, optional, tag = "2")]
    pub dns: Option<DnsSettings>,
    #[prost(message, optional, tag = "3")]
    pub http: Option<HttpSettings>,
    #[prost(message, optional, tag = "4")]
    pub tcp: Option<TcpSettings>,
    #[prost(message, optional, tag = "5")]
    pub traceroute: Option<TracerouteSettings>,
    #[prost(message, optional, tag = "6")]
    pub scripted: Option<ScriptedSettings>,
    #[prost(message, optional, tag = "7")]
    pub multi_http: Option<MultiHttpSettings>,
    #[prost(message, optional, tag = "8")]
    pub grpc: Option<GrpcSettings>,
    #[prost(message, optional, tag = "9")]
    pub browser: Option<BrowserSettings>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Check {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub tenant_id: i64,
    #[prost(int64, tag = "3")]
    pub frequency: i64,
    #[prost(int64, tag = "4")]
    pub offset: i64,
    #[prost(int64, tag = "5")]
    pub timeout: i64,
    #[prost(int64, repeated, tag = "6")]
    pub probes: Vec<i64>,
    #[prost(string, tag = "7")]
    pub target: String,
    #[prost(string, tag = "8")]
    pub job: String,
    #[prost(message, repeated, tag = "9")]
    pub labels: Vec<Label>,
    #[prost(message, optional, tag = "10")]
    pub settings: Option<CheckSettings>,
    #[prost(double, tag = "11")]
    pub modified: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Snapshot {
    #[prost(message, repeated, tag = "1")]
    pub checks: Vec<Check>,
}

/// One message on the change stream: a delta, or the authoritative snapshot
/// the server sends on (re)connect.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChangeEvent {
    #[prost(oneof = "change_event::Event", tags = "1, 2, 3, 4")]
    pub event: Option<change_event::Event>,
}

pub mod change_event {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        Add(super::Check),
        #[prost(message, tag = "2")]
        Update(super::Check),
        #[prost(int64, tag = "3")]
        Delete(i64),
        #[prost(message, tag = "4")]
        Snapshot(super::Snapshot),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TenantInfo {
    #[prost(int64, tag = "1")]
    pub id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoteDatasource {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub url: String,
    #[prost(string, tag = "3")]
    pub username: String,
    #[prost(string, tag = "4")]
    pub password: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SecretStore {
    #[prost(string, tag = "1")]
    pub url: String,
    #[prost(string, tag = "2")]
    pub token: String,
    /// Epoch seconds; zero means no expiry.
    #[prost(double, tag = "3")]
    pub expiry: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Tenant {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(message, optional, tag = "2")]
    pub metrics_remote: Option<RemoteDatasource>,
    #[prost(message, optional, tag = "3")]
    pub logs_remote: Option<RemoteDatasource>,
    #[prost(message, optional, tag = "4")]
    pub secret_store: Option<SecretStore>,
    #[prost(bool, tag = "5")]
    pub omit_label_prefix: bool,
    #[prost(double, tag = "6")]
    pub modified: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckClassTelemetry {
    #[prost(int64, tag = "1")]
    pub local_tenant_id: i64,
    #[prost(enumeration = "CheckClass", tag = "2")]
    pub check_class: i32,
    #[prost(int64, tag = "3")]
    pub executions: i64,
    #[prost(double, tag = "4")]
    pub duration_seconds: f64,
    #[prost(int64, tag = "5")]
    pub sampled_executions: i64,
    #[prost(message, repeated, tag = "6")]
    pub cost_attribution: Vec<Label>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegionTelemetry {
    #[prost(int32, tag = "1")]
    pub region_id: i32,
    #[prost(message, repeated, tag = "2")]
    pub telemetry: Vec<CheckClassTelemetry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    Error = 1,
    NotFound = 2,
    NotAuthorized = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushTelemetryResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
}
