use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use super::error::ApiError;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn from_unix(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(TimeStamp)
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(TimeStamp)
    }
    /// A timestamp strictly later than `prev`, as close to now as possible.
    pub fn after(prev: TimeStamp) -> Self {
        let now = Self::now();
        if now > prev {
            return now;
        }
        TimeStamp(prev.0 + TimeDelta::nanoseconds(1))
    }
    pub fn plus_secs(&self, secs: u64) -> Option<Self> {
        let secs = i64::try_from(secs).ok()?;
        let delta = TimeDelta::try_seconds(secs)?;
        self.0.checked_add_signed(delta).map(TimeStamp)
    }
    pub fn secs_until(&self, later: &TimeStamp) -> i64 {
        (later.0 - self.0).num_seconds()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Security,
    Hsse,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Security, Role::Hsse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Security => "SECURITY",
            Role::Hsse => "HSSE",
        }
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ApiError::bad_request(format!("unknown role {s}. use ADMIN, SECURITY or HSSE")))
    }
}

/// The authenticated caller. Every mutation is scoped to `branch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub identity: String,
    pub name: String,
    pub branch: String,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(identity: &str, name: &str, branch: &str, roles: &[Role]) -> Self {
        Self {
            identity: identity.to_string(),
            name: name.to_string(),
            branch: super::utils::normalize(branch),
            roles: roles.to_vec(),
        }
    }
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
    pub fn require_any(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.iter().any(|r| self.has_role(*r)) {
            return Ok(());
        }
        let wanted: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(ApiError::unauthorized(format!(
            "user {} requires one of the roles {}",
            self.name,
            wanted.join(", ")
        )))
    }
    pub fn stamp(&self, at: TimeStamp) -> Audit {
        Audit {
            at,
            by: self.name.clone(),
            by_id: self.identity.clone(),
        }
    }
}

/// Who touched a document and when.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct Audit {
    #[n(0)]
    pub at: TimeStamp,
    #[n(1)]
    pub by: String,
    #[n(2)]
    pub by_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::now();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn after_is_strictly_later() {
        let future = TimeStamp::now().plus_secs(3600).unwrap();
        let next = TimeStamp::after(future);

        assert!(next > future);
        assert!(TimeStamp::after(TimeStamp::now()) > TimeStamp::from_unix(0).unwrap());
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!("hsse".parse::<Role>().unwrap(), Role::Hsse);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn actor_requires_role() {
        let actor = Actor::new("u1", "budi", "bjm", &[Role::Security]);
        assert_eq!(actor.branch, "BJM");
        assert!(actor.require_any(&[Role::Security]).is_ok());
        assert!(matches!(
            actor.require_any(&[Role::Hsse]),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
