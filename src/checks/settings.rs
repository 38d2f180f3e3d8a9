use super::model::{CheckType, Label};
use super::secret::Secret;
use serde::{Deserialize, Serialize};

/// Wire enums are strings: accepted case-insensitively, marshalled to the
/// canonical lowercase name, empty string unmarshals to the zero value.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident, { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("unknown {} value `{s}`", stringify!($name)))
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                if s.is_empty() {
                    return Ok(Self::default());
                }
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_enum!(IpVersion, default = V4, {
    V4 => "v4",
    V6 => "v6",
    Any => "any",
});

string_enum!(DnsRecordType, default = A, {
    A => "a",
    Aaaa => "aaaa",
    Cname => "cname",
    Mx => "mx",
    Ns => "ns",
    Ptr => "ptr",
    Soa => "soa",
    Srv => "srv",
    Txt => "txt",
});

string_enum!(DnsProtocol, default = Udp, {
    Udp => "udp",
    Tcp => "tcp",
});

string_enum!(HttpMethod, default = Get, {
    Get => "get",
    Head => "head",
    Post => "post",
    Put => "put",
    Delete => "delete",
    Options => "options",
    Patch => "patch",
});

string_enum!(AssertionType, default = Text, {
    Text => "text",
    JsonPathValue => "json_path_value",
    JsonPathAssertion => "json_path_assertion",
    Regex => "regex",
});

string_enum!(AssertionCondition, default = Contains, {
    Contains => "contains",
    NotContains => "not_contains",
    Equals => "equals",
    StartsWith => "starts_with",
    EndsWith => "ends_with",
});

string_enum!(AssertionSubject, default = ResponseBody, {
    ResponseBody => "response_body",
    ResponseHeaders => "response_headers",
    HttpStatusCode => "http_status_code",
});

string_enum!(VariableType, default = JsonPath, {
    JsonPath => "json_path",
    Regex => "regex",
    CssSelector => "css_selector",
});

/// Per-type check settings. Exactly one variant is set; the check type is
/// derived from which one. The JSON form is the externally tagged map with a
/// single key, matching the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSettings {
    Dns(DnsSettings),
    Http(HttpSettings),
    Ping(PingSettings),
    Tcp(TcpSettings),
    Traceroute(TracerouteSettings),
    Scripted(ScriptedSettings),
    #[serde(rename = "multihttp")]
    MultiHttp(MultiHttpSettings),
    Grpc(GrpcSettings),
    Browser(BrowserSettings),
}

impl CheckSettings {
    pub fn check_type(&self) -> CheckType {
        match self {
            Self::Dns(_) => CheckType::Dns,
            Self::Http(_) => CheckType::Http,
            Self::Ping(_) => CheckType::Ping,
            Self::Tcp(_) => CheckType::Tcp,
            Self::Traceroute(_) => CheckType::Traceroute,
            Self::Scripted(_) => CheckType::Scripted,
            Self::MultiHttp(_) => CheckType::MultiHttp,
            Self::Grpc(_) => CheckType::Grpc,
            Self::Browser(_) => CheckType::Browser,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSettings {
    pub record_type: DnsRecordType,
    pub protocol: DnsProtocol,
    pub ip_version: IpVersion,
    pub port: u16,
    pub valid_r_codes: Vec<String>,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            record_type: DnsRecordType::default(),
            protocol: DnsProtocol::default(),
            ip_version: IpVersion::default(),
            port: 53,
            valid_r_codes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub method: HttpMethod,
    pub headers: Vec<String>,
    pub body: String,
    pub ip_version: IpVersion,
    pub fail_if_ssl: bool,
    pub fail_if_not_ssl: bool,
    pub valid_status_codes: Vec<u16>,
    pub valid_http_versions: Vec<String>,
    pub fail_if_body_matches_regexp: Vec<String>,
    pub fail_if_body_not_matches_regexp: Vec<String>,
    pub fail_if_header_matches_regexp: Vec<HeaderMatch>,
    pub fail_if_header_not_matches_regexp: Vec<HeaderMatch>,
    pub basic_auth: Option<BasicAuth>,
    pub bearer_token: Secret,
    pub cache_busting_query_param_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderMatch {
    pub header: String,
    pub regexp: String,
    pub allow_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAuth {
    pub username: String,
    pub password: Secret,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PingSettings {
    pub ip_version: IpVersion,
    pub payload_size: i64,
    pub dont_fragment: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpSettings {
    pub ip_version: IpVersion,
    pub tls: bool,
    pub query_response: Vec<TcpQueryResponse>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpQueryResponse {
    pub send: String,
    pub expect: String,
    pub start_tls: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerouteSettings {
    pub max_hops: i64,
    pub max_unknown_hops: i64,
    pub ptr_lookup: bool,
}

impl Default for TracerouteSettings {
    fn default() -> Self {
        Self {
            max_hops: 64,
            max_unknown_hops: 15,
            ptr_lookup: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedSettings {
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcSettings {
    pub service: String,
    pub ip_version: IpVersion,
    pub tls: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiHttpSettings {
    pub entries: Vec<MultiHttpEntry>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiHttpEntry {
    pub request: MultiHttpRequest,
    pub assertions: Vec<Assertion>,
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiHttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<Label>,
    pub query_fields: Vec<Label>,
    pub body: String,
}

/// One assertion over a multi-http response. Which optional fields must be
/// set (and which must not) depends on `kind`; the validator enforces the
/// exclusivity explicitly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Assertion {
    #[serde(rename = "type")]
    pub kind: AssertionType,
    pub condition: Option<AssertionCondition>,
    pub subject: Option<AssertionSubject>,
    pub expression: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Variable {
    #[serde(rename = "type")]
    pub kind: VariableType,
    pub name: String,
    pub expression: String,
}
