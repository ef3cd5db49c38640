//! Soyal terminal operations
//!
//! The event log is read one record at a time: the device keeps returning
//! its oldest event until that event is deleted. Fingerprint transfers run
//! with the matching subsystem paused and always resume it afterwards.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use tracing::{debug, info, trace, warn};

use punchwire_core::command::{fingerprint_op, soyal_status, SoyalCommand};
use punchwire_core::constants::soyal::*;
use punchwire_core::fields;
use punchwire_core::packet::soyal::Packet;
use punchwire_core::segment::{self, Segment};
use punchwire_core::ErrorKind;
use punchwire_types::{PunchLog, PunchMethod, Template, Vendor};

use crate::clock;
use crate::drain::{drain, Batch, BatchSource};
use crate::error::Result;
use crate::session::Session;
use crate::store::{settle, PunchSink, Store};

/// User id as carried by fingerprint commands
type UserKey = [u8; 4];

/// Send `command` in its frame shape and decode the reply
pub async fn request(
    session: &mut Session<'_>,
    command: SoyalCommand,
    payload: impl Into<Bytes>,
) -> Result<Packet> {
    let destination: [u8; 1] = fields::be_bytes(session.device_id() as u64)?;
    let packet = Packet::request(destination[0], command, payload);
    trace!("Sending: {:?}", packet);

    let frame = packet.encode()?;
    let reply = Packet::decode(session.exchange(&frame).await?)?;

    trace!("Received: {:?}", reply);
    Ok(reply)
}

/// Send `command` and judge the reply by what the command expects
///
/// Fingerprint sub-commands that only acknowledge fail unless the device
/// answered with an explicit ACK.
pub async fn call(
    session: &mut Session<'_>,
    command: SoyalCommand,
    payload: impl Into<Bytes>,
) -> Result<Packet> {
    let payload = payload.into();
    let kind = command.reply_kind(&payload);

    let reply = request(session, command, payload).await?;
    reply.expect(command, kind)?;
    Ok(reply)
}

fn require_len(data: &[u8], expected: usize, command: SoyalCommand) -> Result<()> {
    if data.len() < expected {
        return Err(punchwire_core::Error::UnexpectedLength {
            command: command.to_string(),
            expected,
            actual: data.len(),
        }
        .into());
    }
    Ok(())
}

/// Read the device clock
///
/// The device reports a two-digit year, placed in the current century.
pub async fn get_time<Tz: TimeZone>(session: &mut Session<'_>, zone: &Tz) -> Result<DateTime<Tz>> {
    let reply = call(session, SoyalCommand::GetTime, Bytes::new()).await?;

    let d = &reply.payload;
    require_len(d, CLOCK_DATA_LEN, SoyalCommand::GetTime)?;
    let year = clock::current_century(zone) + (d[7] % 100) as i32;
    clock::local(zone, year, d[6], d[5], d[3], d[2], d[1])
}

/// Set the device clock to the wall-clock fields of `at`
pub async fn set_time<Tz: TimeZone>(session: &mut Session<'_>, at: &DateTime<Tz>) -> Result<()> {
    let payload = vec![
        at.second() as u8,
        at.minute() as u8,
        at.hour() as u8,
        at.weekday().num_days_from_sunday() as u8 + 1,
        at.day() as u8,
        at.month() as u8,
        at.year().rem_euclid(100) as u8,
    ];

    call(session, SoyalCommand::SetTime, payload).await?;
    Ok(())
}

/// Drain the event log into `store`, deleting each event once read
///
/// An event is deleted on the device as soon as it has been handed to the
/// store, inside the still uncommitted transaction. A failure after that
/// delete loses the event.
pub async fn download_logs<Tz: TimeZone + Sync>(
    session: &mut Session<'_>,
    store: &mut dyn Store,
    terminal: i64,
    zone: &Tz,
) -> Result<usize> {
    store.begin().await?;

    let mut source = EventLog {
        zone,
        terminal,
        century: clock::current_century(zone),
    };
    let mut sink = PunchSink { store: &mut *store };
    let result = drain(&mut source, session, &mut sink).await;

    settle(store, result).await
}

/// Download the templates of every active user in `store`
///
/// Returns the number of users a template was found for.
pub async fn download_users(session: &mut Session<'_>, store: &mut dyn Store) -> Result<usize> {
    let ids = store.active_user_ids().await?;
    let keys = ids
        .iter()
        .map(|&id| Ok((id, fields::be_bytes::<4>(id)?)))
        .collect::<Result<Vec<(u64, UserKey)>>>()?;

    store.begin().await?;
    let result = store_templates(session, &mut *store, &keys).await;
    settle(store, result).await
}

async fn store_templates(
    session: &mut Session<'_>,
    store: &mut dyn Store,
    keys: &[(u64, UserKey)],
) -> Result<usize> {
    set_matching(session, fingerprint_op::PAUSE).await?;
    let fetched = fetch_templates(session, keys).await;
    let fetched = resume_after(session, fetched).await?;

    for (user_id, blob) in &fetched {
        let template = Template::new(*user_id, TEMPLATE_SLOT, blob.clone());
        store
            .replace_templates(*user_id, Vendor::Soyal, &[template])
            .await?;
    }

    Ok(fetched.len())
}

async fn fetch_templates(
    session: &mut Session<'_>,
    keys: &[(u64, UserKey)],
) -> Result<Vec<(u64, Bytes)>> {
    let mut fetched = Vec::new();

    for &(user_id, key) in keys {
        match read_template(session, key).await {
            Ok(Some(blob)) => fetched.push((user_id, blob)),
            Ok(None) => trace!("User {} has no template", user_id),
            Err(e) if e.kind() == ErrorKind::DeviceStatus => {
                warn!("Skipping templates of user {}: {}", user_id, e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(fetched)
}

/// Write the stored templates of `user_ids`
///
/// Every template length is checked before the subsystem is paused. A
/// template the device refuses is skipped; the count of written templates is
/// returned.
pub async fn upload_users(
    session: &mut Session<'_>,
    store: &mut dyn Store,
    user_ids: &[u64],
) -> Result<usize> {
    let templates = store.load_templates(Vendor::Soyal, user_ids).await?;
    let plans = templates
        .iter()
        .map(|t| {
            Ok((
                t.user_id,
                fields::be_bytes::<4>(t.user_id)?,
                segment::plan_upload(&t.data, TEMPLATE_SIZE)?,
            ))
        })
        .collect::<Result<Vec<(u64, UserKey, Vec<Segment>)>>>()?;

    set_matching(session, fingerprint_op::PAUSE).await?;
    let written = write_templates(session, &plans).await;
    let written = resume_after(session, written).await?;

    info!("Uploaded {} of {} templates", written, plans.len());
    Ok(written)
}

async fn write_templates(
    session: &mut Session<'_>,
    plans: &[(u64, UserKey, Vec<Segment>)],
) -> Result<usize> {
    let mut written = 0;

    for (user_id, key, segments) in plans {
        match write_template(session, *key, segments).await {
            Ok(()) => written += 1,
            Err(e) if e.kind() == ErrorKind::DeviceStatus => {
                warn!("Skipping template of user {}: {}", user_id, e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(written)
}

/// Resume matching whatever `result` is
///
/// A resume failure after a failed body is logged; the body's error wins.
async fn resume_after<T>(session: &mut Session<'_>, result: Result<T>) -> Result<T> {
    let resumed = set_matching(session, fingerprint_op::RESUME).await;

    match (result, resumed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(resume)) => {
            warn!("Failed to resume fingerprint matching after {}: {}", e, resume);
            Err(e)
        }
    }
}

async fn fingerprint(session: &mut Session<'_>, payload: Bytes) -> Result<Packet> {
    call(session, SoyalCommand::Fingerprint, payload).await
}

async fn set_matching(session: &mut Session<'_>, op: u8) -> Result<()> {
    let payload = Bytes::from(vec![fingerprint_op::SUBSYSTEM, op]);
    fingerprint(session, payload).await?;
    debug!(
        "Fingerprint matching {}",
        if op == fingerprint_op::PAUSE { "paused" } else { "resumed" }
    );
    Ok(())
}

/// Number of template units stored for a user (0, 1 or 2)
async fn template_count(session: &mut Session<'_>, key: UserKey) -> Result<u16> {
    let mut payload = BytesMut::with_capacity(5);
    payload.put_u8(fingerprint_op::COUNT);
    payload.put_slice(&key);

    let reply = fingerprint(session, payload.freeze()).await?;
    let data = &reply.payload;
    require_len(data, 4, SoyalCommand::Fingerprint)?;

    Ok(fields::read_be(&data[data.len() - 4..data.len() - 2]) as u16)
}

/// Fetch a user's whole template, `None` when the device holds none
async fn read_template(session: &mut Session<'_>, key: UserKey) -> Result<Option<Bytes>> {
    let count = template_count(session, key).await?;
    let plan = segment::plan_download(count, TEMPLATE_SIZE)?;
    if plan.is_empty() {
        return Ok(None);
    }

    let mut pieces = Vec::with_capacity(plan.len());
    for (offset, len) in plan {
        let mut payload = BytesMut::with_capacity(9);
        payload.put_u8(fingerprint_op::READ);
        payload.put_slice(&key);
        payload.put_slice(&fields::be_bytes::<2>(offset as u64)?);
        payload.put_slice(&fields::be_bytes::<2>(len as u64)?);

        let reply = fingerprint(session, payload.freeze()).await?;
        require_len(&reply.payload, 1, SoyalCommand::Fingerprint)?;
        pieces.push(reply.payload.slice(1..));
    }

    Ok(Some(segment::reassemble(pieces, TEMPLATE_SIZE)?))
}

/// Replace a user's templates with `segments`
async fn write_template(session: &mut Session<'_>, key: UserKey, segments: &[Segment]) -> Result<()> {
    let mut payload = BytesMut::with_capacity(9);
    payload.put_u8(fingerprint_op::DELETE_RANGE);
    payload.put_slice(&key);
    payload.put_slice(&key);
    fingerprint(session, payload.freeze()).await?;

    for segment in segments {
        let mut payload = BytesMut::with_capacity(11 + segment.data.len());
        payload.put_u8(fingerprint_op::WRITE);
        payload.put_slice(&key);
        payload.put_slice(&fields::be_bytes::<2>(segment.total as u64)?);
        payload.put_slice(&fields::be_bytes::<2>(segment.offset as u64)?);
        payload.put_slice(&fields::be_bytes::<2>(segment.data.len() as u64)?);
        payload.put_slice(&segment.data);

        fingerprint(session, payload.freeze()).await?;
    }

    Ok(())
}

/// Decode an event reply: the event code followed by its data bytes
///
/// Events without a user (id 0) yield `None`.
pub fn decode_event<Tz: TimeZone>(
    event: u8,
    data: &[u8],
    zone: &Tz,
    century: i32,
    terminal: i64,
) -> Result<Option<PunchLog>> {
    require_len(data, LOG_DATA_LEN, SoyalCommand::ReadOldestLog)?;

    let user_id = fields::read_be(&data[9..11]);
    if user_id == 0 {
        trace!("Dropping event {} without user", soyal_status::name(event));
        return Ok(None);
    }

    let method = match event {
        soyal_status::EVENT_CARD_OK => PunchMethod::Card,
        soyal_status::EVENT_FINGERPRINT_OK => PunchMethod::Fingerprint,
        _ => PunchMethod::None,
    };
    let timestamp = clock::local(
        zone,
        century + (data[7] % 100) as i32,
        data[6],
        data[5],
        data[3],
        data[2],
        data[1],
    )?;

    Ok(Some(PunchLog {
        user_id,
        timestamp: clock::to_fixed(&timestamp),
        method,
        work_code: data[25] as u32,
        valid: method != PunchMethod::None,
        terminal,
        event: Some(event),
    }))
}

struct EventLog<'z, Tz> {
    zone: &'z Tz,
    terminal: i64,
    century: i32,
}

#[async_trait]
impl<'z, Tz: TimeZone + Sync> BatchSource for EventLog<'z, Tz> {
    type Record = PunchLog;

    /// A batch holds at most one event, stored as `[event, data..]`
    async fn fetch(&mut self, session: &mut Session<'_>, _first: bool) -> Result<Batch> {
        let reply = call(session, SoyalCommand::ReadOldestLog, Bytes::new()).await?;

        if reply.is_ack() {
            return Ok(Batch::end());
        }

        let mut raw = BytesMut::with_capacity(1 + reply.payload.len());
        raw.put_u8(reply.command);
        raw.put_slice(&reply.payload);
        Ok(Batch {
            count: 1,
            records: vec![raw.freeze()],
        })
    }

    fn decode(&self, raw: &[u8]) -> Result<Option<PunchLog>> {
        let Some((&event, data)) = raw.split_first() else {
            return Ok(None);
        };
        decode_event(event, data, self.zone, self.century, self.terminal)
    }

    async fn consumed(&mut self, session: &mut Session<'_>) -> Result<()> {
        call(session, SoyalCommand::DeleteOldestLog, Bytes::new()).await?;
        Ok(())
    }
}
