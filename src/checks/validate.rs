use super::id;
use super::model::{Check, Label};
use super::settings::{
    Assertion, AssertionType, CheckSettings, HttpSettings, MultiHttpSettings, Variable,
};
use regex::Regex;
use std::collections::HashSet;
use std::net::IpAddr;
use thiserror::Error;
use url::Url;

pub const MAX_LABELS: usize = 10;
pub const MAX_LABEL_LENGTH: usize = 128;
pub const MAX_MULTIHTTP_ENTRIES: usize = 10;
pub const MAX_MULTIHTTP_ASSERTIONS: usize = 5;
pub const MAX_MULTIHTTP_VARIABLES: usize = 5;

const MAX_FQDN_LENGTH: usize = 255;
const MAX_DNS_LABEL_LENGTH: usize = 63;

/// Why a check definition was rejected. Carries enough context to log and
/// count the drop; the check itself is never retried.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("invalid check id {0}")]
    InvalidCheckId(i64),
    #[error("invalid tenant id {0}")]
    InvalidTenantId(i64),
    #[error("check has no probes assigned")]
    NoProbes,
    #[error("invalid probe id {0}")]
    InvalidProbeId(i64),
    #[error("invalid job `{0}`")]
    InvalidJob(String),
    #[error(
        "invalid frequency {found_ms} ms for {check_type} check, allowed [{min_ms}, {max_ms}] ms"
    )]
    InvalidFrequency {
        check_type: &'static str,
        found_ms: i64,
        min_ms: i64,
        max_ms: i64,
    },
    #[error(
        "invalid timeout {found_ms} ms for {check_type} check, allowed [{min_ms}, {max_ms}] ms"
    )]
    InvalidTimeout {
        check_type: &'static str,
        found_ms: i64,
        min_ms: i64,
        max_ms: i64,
    },
    #[error("too many labels ({0}, at most {MAX_LABELS})")]
    TooManyLabels(usize),
    #[error("invalid label name `{0}`")]
    InvalidLabelName(String),
    #[error("duplicate label name `{0}`")]
    DuplicateLabelName(String),
    #[error("label `{0}` exceeds the length limit")]
    LabelTooLong(String),
    #[error("invalid {kind} target `{target}`: {reason}")]
    InvalidTarget {
        kind: &'static str,
        target: String,
        reason: String,
    },
    #[error("regex `{pattern}` in {field} does not compile")]
    InvalidRegex {
        field: &'static str,
        pattern: String,
    },
    #[error("multihttp needs between 1 and {MAX_MULTIHTTP_ENTRIES} entries, got {0}")]
    InvalidEntryCount(usize),
    #[error("multihttp entry {entry}: too many assertions ({found}, at most {MAX_MULTIHTTP_ASSERTIONS})")]
    TooManyAssertions { entry: usize, found: usize },
    #[error("multihttp entry {entry}: too many variables ({found}, at most {MAX_MULTIHTTP_VARIABLES})")]
    TooManyVariables { entry: usize, found: usize },
    #[error("multihttp entry {entry}: duplicate variable `{name}`")]
    DuplicateVariable { entry: usize, name: String },
    #[error("multihttp entry {entry}: invalid variable `{name}`: {reason}")]
    InvalidVariable {
        entry: usize,
        name: String,
        reason: &'static str,
    },
    #[error("multihttp entry {entry}, assertion {index}: {reason}")]
    InvalidAssertion {
        entry: usize,
        index: usize,
        reason: &'static str,
    },
}

impl Check {
    /// Structural and semantic validation of a check definition. Pure and
    /// total: any input yields `Ok` or one of the [`ValidationError`] kinds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !id::is_local(self.id) && !id::is_global(self.id) {
            return Err(ValidationError::InvalidCheckId(self.id));
        }
        if !id::is_local(self.tenant_id) && !id::is_global(self.tenant_id) {
            return Err(ValidationError::InvalidTenantId(self.tenant_id));
        }
        if self.probes.is_empty() {
            return Err(ValidationError::NoProbes);
        }
        for &probe_id in &self.probes {
            if !id::is_local(probe_id) && !id::is_global(probe_id) {
                return Err(ValidationError::InvalidProbeId(probe_id));
            }
        }
        if self.job.is_empty() || self.job.len() > MAX_LABEL_LENGTH {
            return Err(ValidationError::InvalidJob(self.job.clone()));
        }

        self.validate_schedule()?;
        validate_labels(&self.labels)?;
        self.validate_target()?;
        self.validate_settings()
    }

    fn validate_schedule(&self) -> Result<(), ValidationError> {
        let check_type = self.check_type();
        let min_frequency = check_type.min_frequency().as_millis() as i64;
        let max_frequency = crate::checks::model::CheckType::MAX_FREQUENCY.as_millis() as i64;
        if self.frequency < min_frequency || self.frequency > max_frequency {
            return Err(ValidationError::InvalidFrequency {
                check_type: check_type.as_str(),
                found_ms: self.frequency,
                min_ms: min_frequency,
                max_ms: max_frequency,
            });
        }

        let min_timeout = crate::checks::model::CheckType::MIN_TIMEOUT.as_millis() as i64;
        let max_timeout = (check_type.max_timeout().as_millis() as i64).min(self.frequency);
        if self.timeout < min_timeout || self.timeout > max_timeout {
            return Err(ValidationError::InvalidTimeout {
                check_type: check_type.as_str(),
                found_ms: self.timeout,
                min_ms: min_timeout,
                max_ms: max_timeout,
            });
        }
        Ok(())
    }

    fn validate_target(&self) -> Result<(), ValidationError> {
        let kind = self.check_type().as_str();
        let reason = match &self.settings {
            CheckSettings::Dns(_) => validate_fqdn(&self.target),
            CheckSettings::Http(_) => validate_http_url(&self.target),
            CheckSettings::Ping(_) | CheckSettings::Traceroute(_) => validate_host(&self.target),
            CheckSettings::Tcp(_) => validate_host_port(&self.target),
            CheckSettings::Grpc(_) => {
                // gRPC targets take an optional port.
                validate_host_port(&self.target).or_else(|_| validate_host(&self.target))
            }
            CheckSettings::Scripted(_) | CheckSettings::MultiHttp(_) | CheckSettings::Browser(_) => {
                if self.target.is_empty() {
                    Err("empty target".to_string())
                } else {
                    Ok(())
                }
            }
        };
        reason.map_err(|reason| ValidationError::InvalidTarget {
            kind,
            target: self.target.clone(),
            reason,
        })
    }

    fn validate_settings(&self) -> Result<(), ValidationError> {
        match &self.settings {
            CheckSettings::Http(http) => validate_http_settings(http),
            CheckSettings::MultiHttp(multi) => validate_multihttp_settings(multi),
            _ => Ok(()),
        }
    }
}

fn validate_labels(labels: &[Label]) -> Result<(), ValidationError> {
    if labels.len() > MAX_LABELS {
        return Err(ValidationError::TooManyLabels(labels.len()));
    }
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        if !is_valid_label_name(&label.name) {
            return Err(ValidationError::InvalidLabelName(label.name.clone()));
        }
        if label.name.len() > MAX_LABEL_LENGTH || label.value.len() > MAX_LABEL_LENGTH {
            return Err(ValidationError::LabelTooLong(label.name.clone()));
        }
        if label.value.is_empty() {
            return Err(ValidationError::LabelTooLong(label.name.clone()));
        }
        if !seen.insert(label.name.as_str()) {
            return Err(ValidationError::DuplicateLabelName(label.name.clone()));
        }
    }
    Ok(())
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// FQDN rules: dot-separated labels of at most 63 characters, 255 total,
/// and the last label must not be all digits (it would parse as part of an
/// IP). A single trailing dot is tolerated.
fn validate_fqdn(target: &str) -> Result<(), String> {
    if target.is_empty() {
        return Err("empty target".to_string());
    }
    if target.len() > MAX_FQDN_LENGTH {
        return Err(format!("longer than {MAX_FQDN_LENGTH} characters"));
    }
    let name = target.strip_suffix('.').unwrap_or(target);
    if name.is_empty() {
        return Err("empty name".to_string());
    }
    let mut last_label = "";
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_DNS_LABEL_LENGTH {
            return Err(format!("invalid dns label `{label}`"));
        }
        let valid_chars = label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_chars || label.starts_with('-') || label.ends_with('-') {
            return Err(format!("invalid dns label `{label}`"));
        }
        last_label = label;
    }
    if last_label.chars().all(|c| c.is_ascii_digit()) {
        return Err("last label must not be all digits".to_string());
    }
    Ok(())
}

/// Hostname or IP literal.
fn validate_host(target: &str) -> Result<(), String> {
    if target.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    validate_fqdn(target)
}

/// `host:port`, with IPv6 hosts in brackets.
fn validate_host_port(target: &str) -> Result<(), String> {
    let (host, port) = if let Some(rest) = target.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| "unbalanced brackets".to_string())?;
        if host.parse::<IpAddr>().is_err() {
            return Err(format!("invalid ipv6 address `{host}`"));
        }
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| "missing port".to_string())?;
        (host.to_string(), port)
    } else {
        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| "missing port".to_string())?;
        (host.to_string(), port)
    };

    match port.parse::<u16>() {
        Ok(0) | Err(_) => return Err(format!("invalid port `{port}`")),
        Ok(_) => {}
    }
    validate_host(&host)
}

/// http(s) URL: scheme restricted, host present, no embedded credentials.
/// Port range and syntax are enforced by the URL parser itself.
fn validate_http_url(target: &str) -> Result<(), String> {
    let url = Url::parse(target).map_err(|err| format!("invalid http url: {err}"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("invalid http url: unsupported scheme `{other}`")),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("invalid http url: missing host".to_string());
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err("invalid http url: embedded credentials".to_string());
    }
    Ok(())
}

fn validate_regexes<'a>(
    field: &'static str,
    patterns: impl IntoIterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    for pattern in patterns {
        if Regex::new(pattern).is_err() {
            return Err(ValidationError::InvalidRegex {
                field,
                pattern: pattern.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_http_settings(http: &HttpSettings) -> Result<(), ValidationError> {
    validate_regexes(
        "fail_if_body_matches_regexp",
        http.fail_if_body_matches_regexp.iter().map(String::as_str),
    )?;
    validate_regexes(
        "fail_if_body_not_matches_regexp",
        http.fail_if_body_not_matches_regexp
            .iter()
            .map(String::as_str),
    )?;
    validate_regexes(
        "fail_if_header_matches_regexp",
        http.fail_if_header_matches_regexp
            .iter()
            .map(|m| m.regexp.as_str()),
    )?;
    validate_regexes(
        "fail_if_header_not_matches_regexp",
        http.fail_if_header_not_matches_regexp
            .iter()
            .map(|m| m.regexp.as_str()),
    )
}

fn validate_multihttp_settings(multi: &MultiHttpSettings) -> Result<(), ValidationError> {
    if multi.entries.is_empty() || multi.entries.len() > MAX_MULTIHTTP_ENTRIES {
        return Err(ValidationError::InvalidEntryCount(multi.entries.len()));
    }
    for (entry_index, entry) in multi.entries.iter().enumerate() {
        validate_http_url(&entry.request.url).map_err(|reason| ValidationError::InvalidTarget {
            kind: "multihttp",
            target: entry.request.url.clone(),
            reason,
        })?;

        if entry.assertions.len() > MAX_MULTIHTTP_ASSERTIONS {
            return Err(ValidationError::TooManyAssertions {
                entry: entry_index,
                found: entry.assertions.len(),
            });
        }
        for (index, assertion) in entry.assertions.iter().enumerate() {
            validate_assertion(assertion).map_err(|reason| ValidationError::InvalidAssertion {
                entry: entry_index,
                index,
                reason,
            })?;
        }

        if entry.variables.len() > MAX_MULTIHTTP_VARIABLES {
            return Err(ValidationError::TooManyVariables {
                entry: entry_index,
                found: entry.variables.len(),
            });
        }
        validate_variables(entry_index, &entry.variables)?;
    }
    Ok(())
}

/// Each assertion kind has its own set of required fields; everything outside
/// that set must stay unset so a mistyped payload cannot silently change
/// meaning.
fn validate_assertion(assertion: &Assertion) -> Result<(), &'static str> {
    let has = (
        assertion.condition.is_some(),
        assertion.subject.is_some(),
        assertion.expression.is_some(),
        assertion.value.is_some(),
    );
    match assertion.kind {
        AssertionType::Text => match has {
            (true, true, false, true) => Ok(()),
            (_, _, true, _) => Err("text assertion must not set an expression"),
            _ => Err("text assertion requires condition, subject and value"),
        },
        AssertionType::JsonPathValue => match has {
            (true, false, true, true) => Ok(()),
            (_, true, _, _) => Err("json path value assertion must not set a subject"),
            _ => Err("json path value assertion requires condition, expression and value"),
        },
        AssertionType::JsonPathAssertion => match has {
            (false, false, true, false) => Ok(()),
            _ => Err("json path assertion takes only an expression"),
        },
        AssertionType::Regex => match has {
            (false, true, true, false) => {
                let pattern = assertion.expression.as_deref().unwrap_or_default();
                if Regex::new(pattern).is_err() {
                    return Err("regex assertion expression does not compile");
                }
                Ok(())
            }
            (true, _, _, _) | (_, _, _, true) => {
                Err("regex assertion must not set condition or value")
            }
            _ => Err("regex assertion requires subject and expression"),
        },
    }
}

fn validate_variables(entry: usize, variables: &[Variable]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(variables.len());
    for variable in variables {
        if variable.name.is_empty() {
            return Err(ValidationError::InvalidVariable {
                entry,
                name: variable.name.clone(),
                reason: "empty name",
            });
        }
        if variable.expression.is_empty() {
            return Err(ValidationError::InvalidVariable {
                entry,
                name: variable.name.clone(),
                reason: "empty expression",
            });
        }
        if !seen.insert(variable.name.as_str()) {
            return Err(ValidationError::DuplicateVariable {
                entry,
                name: variable.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::model::tests::{http_check, ping_check};
    use crate::checks::settings::{
        AssertionCondition, AssertionSubject, MultiHttpEntry, MultiHttpRequest, TracerouteSettings,
    };
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[test]
    fn valid_ping_check_accepted() {
        assert_eq!(ping_check(1, 1).validate(), Ok(()));
    }

    #[test]
    fn valid_http_check_accepted() {
        assert_eq!(http_check(1, 1).validate(), Ok(()));
    }

    #[test]
    fn http_check_with_ftp_target_rejected() {
        let mut check = http_check(1, 1);
        check.target = "ftp://example.org/".to_string();
        assert_matches!(
            check.validate(),
            Err(ValidationError::InvalidTarget { kind: "http", reason, .. }) => {
                assert!(reason.contains("invalid http url"));
            }
        );
    }

    #[rstest]
    #[case::credentials("https://user:pw@example.org/")]
    #[case::no_host("http:///path")]
    #[case::bad_port("https://example.org:70000/")]
    #[case::garbage("not a url")]
    fn bad_http_urls_rejected(#[case] target: &str) {
        let mut check = http_check(1, 1);
        check.target = target.to_string();
        assert_matches!(
            check.validate(),
            Err(ValidationError::InvalidTarget { kind: "http", .. })
        );
    }

    #[test]
    fn check_id_zero_rejected() {
        let check = ping_check(0, 1);
        assert_eq!(check.validate(), Err(ValidationError::InvalidCheckId(0)));
    }

    #[test]
    fn no_probes_rejected() {
        let mut check = ping_check(1, 1);
        check.probes.clear();
        assert_eq!(check.validate(), Err(ValidationError::NoProbes));
    }

    #[rstest]
    #[case::too_fast(500)]
    #[case::too_slow(3_600_001)]
    fn frequency_out_of_range(#[case] frequency: i64) {
        let mut check = ping_check(1, 1);
        check.frequency = frequency;
        assert_matches!(
            check.validate(),
            Err(ValidationError::InvalidFrequency { found_ms, .. }) => {
                assert_eq!(found_ms, frequency);
            }
        );
    }

    #[test]
    fn timeout_longer_than_frequency_rejected() {
        let mut check = ping_check(1, 1);
        check.frequency = 1000;
        check.timeout = 2000;
        assert_matches!(check.validate(), Err(ValidationError::InvalidTimeout { .. }));
    }

    #[test]
    fn traceroute_frequency_floor() {
        let mut check = ping_check(1, 1);
        check.settings = CheckSettings::Traceroute(TracerouteSettings::default());
        check.frequency = 60_000;
        check.timeout = 10_000;
        assert_matches!(
            check.validate(),
            Err(ValidationError::InvalidFrequency { min_ms: 120_000, .. })
        );

        check.frequency = 120_000;
        assert_eq!(check.validate(), Ok(()));
    }

    #[test]
    fn duplicate_labels_rejected() {
        let mut check = ping_check(1, 1);
        check.labels = vec![Label::new("env", "prod"), Label::new("env", "dev")];
        assert_eq!(
            check.validate(),
            Err(ValidationError::DuplicateLabelName("env".to_string()))
        );
    }

    #[rstest]
    #[case::leading_digit("0env")]
    #[case::dash("en-v")]
    #[case::space("en v")]
    #[case::empty("")]
    fn invalid_label_names_rejected(#[case] name: &str) {
        let mut check = ping_check(1, 1);
        check.labels = vec![Label::new(name, "x")];
        assert_matches!(check.validate(), Err(ValidationError::InvalidLabelName(_)));
    }

    #[test]
    fn too_many_labels_rejected() {
        let mut check = ping_check(1, 1);
        check.labels = (0..=MAX_LABELS)
            .map(|i| Label::new(format!("l{i}"), "v"))
            .collect();
        assert_eq!(
            check.validate(),
            Err(ValidationError::TooManyLabels(MAX_LABELS + 1))
        );
    }

    #[rstest]
    #[case::valid_fqdn("grafana.com", true)]
    #[case::trailing_dot("grafana.com.", true)]
    #[case::srv_label("_sip._tcp.example.org", true)]
    #[case::all_digit_tld("example.123", false)]
    #[case::empty("", false)]
    #[case::double_dot("a..b", false)]
    #[case::hyphen_edge("-bad.example.org", false)]
    fn dns_targets(#[case] target: &str, #[case] valid: bool) {
        let mut check = ping_check(1, 1);
        check.settings = CheckSettings::Dns(Default::default());
        check.target = target.to_string();
        assert_eq!(check.validate().is_ok(), valid, "target `{target}`");
    }

    #[test]
    fn dns_label_length_limits() {
        let long_label = "a".repeat(64);
        let mut check = ping_check(1, 1);
        check.settings = CheckSettings::Dns(Default::default());
        check.target = format!("{long_label}.example.org");
        assert_matches!(check.validate(), Err(ValidationError::InvalidTarget { .. }));

        let long_name = format!("{}.example", "a.".repeat(130));
        check.target = long_name;
        assert_matches!(check.validate(), Err(ValidationError::InvalidTarget { .. }));
    }

    #[rstest]
    #[case::host_port("example.org:443", true)]
    #[case::ip_port("192.0.2.1:80", true)]
    #[case::ipv6_port("[2001:db8::1]:53", true)]
    #[case::missing_port("example.org", false)]
    #[case::port_zero("example.org:0", false)]
    #[case::port_overflow("example.org:99999", false)]
    #[case::bare_ipv6("2001:db8::1", false)]
    fn tcp_targets(#[case] target: &str, #[case] valid: bool) {
        let mut check = ping_check(1, 1);
        check.settings = CheckSettings::Tcp(Default::default());
        check.target = target.to_string();
        check.timeout = 1000;
        assert_eq!(check.validate().is_ok(), valid, "target `{target}`");
    }

    #[test]
    fn ping_accepts_ip_literals() {
        for target in ["127.0.0.1", "2001:db8::1", "example.org"] {
            let mut check = ping_check(1, 1);
            check.target = target.to_string();
            assert_eq!(check.validate(), Ok(()), "target `{target}`");
        }
    }

    #[test]
    fn bad_regex_rejected() {
        let mut check = http_check(1, 1);
        check.settings = CheckSettings::Http(HttpSettings {
            fail_if_body_matches_regexp: vec!["(unclosed".to_string()],
            ..Default::default()
        });
        assert_matches!(
            check.validate(),
            Err(ValidationError::InvalidRegex {
                field: "fail_if_body_matches_regexp",
                ..
            })
        );
    }

    fn multihttp_check(entries: Vec<MultiHttpEntry>) -> Check {
        let mut check = ping_check(1, 1);
        check.frequency = 60_000;
        check.timeout = 15_000;
        check.target = "https://example.org/".to_string();
        check.settings = CheckSettings::MultiHttp(MultiHttpSettings { entries });
        check
    }

    fn entry(url: &str) -> MultiHttpEntry {
        MultiHttpEntry {
            request: MultiHttpRequest {
                url: url.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn multihttp_entry_bounds() {
        assert_eq!(
            multihttp_check(Vec::new()).validate(),
            Err(ValidationError::InvalidEntryCount(0))
        );

        let entries = (0..11).map(|_| entry("https://example.org/")).collect();
        assert_eq!(
            multihttp_check(entries).validate(),
            Err(ValidationError::InvalidEntryCount(11))
        );

        let entries = vec![entry("https://example.org/"), entry("https://example.net/")];
        assert_eq!(multihttp_check(entries).validate(), Ok(()));
    }

    #[test]
    fn multihttp_assertion_exclusivity() {
        let mut e = entry("https://example.org/");
        e.assertions = vec![Assertion {
            kind: AssertionType::Text,
            condition: Some(AssertionCondition::Contains),
            subject: Some(AssertionSubject::ResponseBody),
            expression: Some("$.status".to_string()),
            value: Some("ok".to_string()),
        }];
        assert_matches!(
            multihttp_check(vec![e]).validate(),
            Err(ValidationError::InvalidAssertion { entry: 0, index: 0, .. })
        );

        let mut e = entry("https://example.org/");
        e.assertions = vec![Assertion {
            kind: AssertionType::Text,
            condition: Some(AssertionCondition::Contains),
            subject: Some(AssertionSubject::ResponseBody),
            expression: None,
            value: Some("ok".to_string()),
        }];
        assert_eq!(multihttp_check(vec![e]).validate(), Ok(()));
    }

    #[test]
    fn multihttp_duplicate_variables() {
        let mut e = entry("https://example.org/");
        e.variables = vec![
            Variable {
                name: "token".to_string(),
                expression: "$.token".to_string(),
                ..Default::default()
            },
            Variable {
                name: "token".to_string(),
                expression: "$.other".to_string(),
                ..Default::default()
            },
        ];
        assert_matches!(
            multihttp_check(vec![e]).validate(),
            Err(ValidationError::DuplicateVariable { entry: 0, name }) => {
                assert_eq!(name, "token");
            }
        );
    }

    /// The validator must terminate with a typed error on adversarial
    /// byte-strings, never panic.
    #[rstest]
    #[case::control_chars("\u{0}\u{1}\u{2}")]
    #[case::long_garbage("\u{7f}://:::::")]
    #[case::unicode("🦀🦀🦀.🦀")]
    #[case::only_dots("......")]
    #[case::null_bytes("a\0b")]
    fn totality_over_garbage_targets(#[case] target: &str) {
        for settings in [
            CheckSettings::Dns(Default::default()),
            CheckSettings::Http(Default::default()),
            CheckSettings::Ping(Default::default()),
            CheckSettings::Tcp(Default::default()),
        ] {
            let mut check = ping_check(1, 1);
            check.settings = settings;
            check.target = target.to_string();
            assert!(check.validate().is_err());
        }
    }
}
