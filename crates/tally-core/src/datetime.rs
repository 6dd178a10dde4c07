use anyhow::anyhow;
use chrono::{
  DateTime,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  SubsecRound,
  TimeZone,
  Utc
};

/// Timestamps are kept at millisecond
/// precision so they survive the ISO-8601
/// round trip unchanged.
#[must_use]
pub fn to_millis(
  dt: DateTime<Utc>
) -> DateTime<Utc> {
  dt.trunc_subsecs(3)
}

#[must_use]
pub fn format_local_date(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(&Local)
    .format("%Y-%m-%d")
    .to_string()
}

/// Overdue means due on an earlier local
/// calendar day; anything due today is
/// still on time.
#[must_use]
pub fn is_overdue(
  due: DateTime<Utc>,
  now: DateTime<Utc>
) -> bool {
  due.with_timezone(&Local).date_naive()
    < now
      .with_timezone(&Local)
      .date_naive()
}

fn local_midnight(
  date: NaiveDate,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  let naive: NaiveDateTime = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct \
         midnight for {context}"
      )
    })?;

  Local
    .from_local_datetime(&naive)
    .earliest()
    .map(|dt| dt.with_timezone(&Utc))
    .ok_or_else(|| {
      anyhow!(
        "local midnight does not \
         exist for {context}"
      )
    })
}

#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_due_input(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  let today = now
    .with_timezone(&Local)
    .date_naive();

  let parsed = match lower.as_str() {
    | "now" => now,
    | "today" => {
      local_midnight(today, "today")?
    }
    | "tomorrow" => {
      local_midnight(
        today + Duration::days(1),
        "tomorrow"
      )?
    }
    | "yesterday" => {
      local_midnight(
        today - Duration::days(1),
        "yesterday"
      )?
    }
    | _ => {
      if let Ok(date) =
        NaiveDate::parse_from_str(
          token, "%Y-%m-%d"
        )
      {
        local_midnight(date, token)?
      } else {
        DateTime::parse_from_rfc3339(
          token
        )
        .map(|dt| {
          dt.with_timezone(&Utc)
        })
        .map_err(|err| {
          anyhow!(
            "unrecognized date \
             '{token}': {err}"
          )
        })?
      }
    }
  };

  Ok(to_millis(parsed))
}

/// ISO-8601 date-time strings in UTC with
/// millisecond precision, the shape a
/// JavaScript `Date#toISOString` produces.
/// Reading also accepts any RFC 3339
/// offset and bare calendar dates.
pub mod iso_date_serde {
  use chrono::{
    DateTime,
    NaiveDate,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::Millis,
        true
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    parse(&raw)
      .map_err(serde::de::Error::custom)
  }

  pub fn parse(
    raw: &str
  ) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(dt) =
      DateTime::parse_from_rfc3339(
        trimmed
      )
    {
      return Ok(
        dt.with_timezone(&Utc)
      );
    }

    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
    .ok()
    .and_then(|date| {
      date.and_hms_opt(0, 0, 0)
    })
    .map(|ndt| ndt.and_utc())
    .ok_or_else(|| {
      format!(
        "invalid ISO-8601 date: \
         {trimmed}"
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    is_overdue,
    iso_date_serde,
    parse_due_input,
    to_millis
  };

  #[test]
  fn iso_strings_parse_as_equal_instants()
   {
    let zulu = iso_date_serde::parse(
      "2024-03-05T10:00:00.000Z"
    )
    .unwrap();
    let offset = iso_date_serde::parse(
      "2024-03-05T12:00:00+02:00"
    )
    .unwrap();
    assert_eq!(zulu, offset);
  }

  #[test]
  fn bare_dates_read_as_utc_midnight() {
    let parsed = iso_date_serde::parse(
      "2024-01-10"
    )
    .unwrap();
    assert_eq!(
      parsed,
      Utc
        .with_ymd_and_hms(
          2024, 1, 10, 0, 0, 0
        )
        .unwrap()
    );
    assert!(
      iso_date_serde::parse("soon")
        .is_err()
    );
  }

  #[test]
  fn due_input_accepts_keywords_and_rfc3339()
   {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();

    let today =
      parse_due_input("today", now)
        .unwrap();
    let tomorrow =
      parse_due_input("Tomorrow", now)
        .unwrap();
    assert!(tomorrow > today);

    assert_eq!(
      parse_due_input("now", now)
        .unwrap(),
      to_millis(now)
    );
    assert_eq!(
      parse_due_input(
        "2026-03-01T08:30:00Z",
        now
      )
      .unwrap(),
      Utc
        .with_ymd_and_hms(
          2026, 3, 1, 8, 30, 0
        )
        .unwrap()
    );
    assert!(
      parse_due_input("someday", now)
        .is_err()
    );
  }

  #[test]
  fn due_today_is_not_overdue() {
    let now = Utc
      .with_ymd_and_hms(
        2024, 1, 10, 12, 0, 0
      )
      .unwrap();
    let today =
      parse_due_input("today", now)
        .unwrap();
    let yesterday =
      parse_due_input("yesterday", now)
        .unwrap();

    assert!(today < now);
    assert!(!is_overdue(today, now));
    assert!(is_overdue(yesterday, now));
    assert!(!is_overdue(now, now));
  }
}
