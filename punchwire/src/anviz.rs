//! Anviz terminal operations
//!
//! Every request is answered by one reply frame echoing the opcode with
//! `0x80` set. Records and users are downloaded in counted batches; the
//! record log is cleared in bulk once the device reports an empty batch.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use tracing::{debug, info, trace};

use punchwire_core::command::{anviz_status, AnvizCommand};
use punchwire_core::constants::anviz::*;
use punchwire_core::fields::{self, ABSENT};
use punchwire_core::packet::anviz::Packet;
use punchwire_types::{PunchLog, PunchMethod, Template, UserRecord, Vendor};

use crate::clock;
use crate::drain::{drain, split_batch, Batch, BatchSource};
use crate::error::Result;
use crate::session::Session;
use crate::store::{settle, PunchSink, Store};

/// Send `command` and decode the reply frame
pub async fn request(
    session: &mut Session<'_>,
    command: AnvizCommand,
    payload: impl Into<Bytes>,
) -> Result<Packet> {
    let packet = Packet::with_payload(session.device_id(), command, payload);
    trace!("Sending: {:?}", packet);

    let frame = packet.encode()?;
    let reply = Packet::decode(session.exchange(&frame).await?)?;

    trace!("Received: {:?}", reply);
    Ok(reply)
}

/// Read the device clock
pub async fn get_time<Tz: TimeZone>(session: &mut Session<'_>, zone: &Tz) -> Result<DateTime<Tz>> {
    let reply = request(session, AnvizCommand::GetTime, Bytes::new()).await?;
    reply.expect_reply(AnvizCommand::GetTime)?;

    let p = &reply.payload;
    clock::local(zone, 2000 + (p[0] % 100) as i32, p[1], p[2], p[3], p[4], p[5])
}

/// Set the device clock to the wall-clock fields of `at`
pub async fn set_time<Tz: TimeZone>(session: &mut Session<'_>, at: &DateTime<Tz>) -> Result<()> {
    let payload = vec![
        at.year().rem_euclid(100) as u8,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
    ];

    let reply = request(session, AnvizCommand::SetTime, payload).await?;
    reply.expect_reply(AnvizCommand::SetTime)?;
    Ok(())
}

/// Remove every user (and template) from the device
pub async fn delete_all_users(session: &mut Session<'_>) -> Result<()> {
    let reply = request(session, AnvizCommand::DeleteAllUsers, Bytes::new()).await?;
    reply.expect_reply(AnvizCommand::DeleteAllUsers)?;
    Ok(())
}

/// Drain the attendance log into `store`, then clear it on the device
///
/// All inserts share one transaction that commits only after the clear was
/// acknowledged. A failure before the clear leaves the device log intact, so
/// the same records are delivered again next time.
pub async fn download_logs<Tz: TimeZone + Sync>(
    session: &mut Session<'_>,
    store: &mut dyn Store,
    terminal: i64,
    zone: &Tz,
) -> Result<usize> {
    store.begin().await?;

    let mut source = RecordPages { zone, terminal };
    let mut sink = PunchSink { store: &mut *store };
    let result = drain(&mut source, session, &mut sink).await;

    settle(store, result).await
}

/// Drain enrolled users and their templates into `store`
///
/// Nothing is cleared on the device.
pub async fn download_users(session: &mut Session<'_>, store: &mut dyn Store) -> Result<usize> {
    store.begin().await?;
    let result = store_users(session, &mut *store).await;
    settle(store, result).await
}

async fn store_users(session: &mut Session<'_>, store: &mut dyn Store) -> Result<usize> {
    let mut users: Vec<UserRecord> = Vec::new();
    drain(&mut UserPages, session, &mut users).await?;
    debug!("Device holds {} users", users.len());

    for user in &users {
        let mut templates = Vec::new();
        for slot in TEMPLATE_SLOTS {
            if let Some(data) = fetch_template(session, user.user_id, slot).await? {
                templates.push(Template::new(user.user_id, slot, data));
            }
        }

        store.upsert_user(user).await?;
        if !templates.is_empty() {
            store
                .replace_templates(user.user_id, Vendor::Anviz, &templates)
                .await?;
        }
    }

    Ok(users.len())
}

/// Upload users and their stored templates
///
/// Every credential, card and template is packed before the first write, so
/// invalid input never leaves the device half updated.
pub async fn upload_users(
    session: &mut Session<'_>,
    store: &mut dyn Store,
    user_ids: &[u64],
) -> Result<usize> {
    let users = store.load_users(user_ids).await?;
    let templates = store.load_templates(Vendor::Anviz, user_ids).await?;

    let blocks = users.iter().map(user_block).collect::<Result<Vec<_>>>()?;
    let uploads = templates
        .iter()
        .map(template_payload)
        .collect::<Result<Vec<_>>>()?;

    for group in blocks.chunks(UPLOAD_USERS_PER_FRAME) {
        let mut payload = BytesMut::with_capacity(1 + group.len() * UPLOAD_USER_LEN);
        payload.put_u8(group.len() as u8);
        for block in group {
            payload.put_slice(block);
        }

        let reply = request(session, AnvizCommand::UploadUsers, payload.freeze()).await?;
        reply.expect_reply(AnvizCommand::UploadUsers)?;
    }

    for payload in uploads {
        let reply = request(session, AnvizCommand::UploadTemplate, payload).await?;
        reply.expect_reply(AnvizCommand::UploadTemplate)?;
    }

    info!(
        "Uploaded {} users and {} templates",
        users.len(),
        templates.len()
    );
    Ok(users.len())
}

/// Fetch the template in `slot`, `None` when the device has none there
async fn fetch_template(session: &mut Session<'_>, user_id: u64, slot: u8) -> Result<Option<Bytes>> {
    let mut payload = BytesMut::with_capacity(USER_ID_LEN + 1);
    payload.put_slice(&fields::be_bytes::<USER_ID_LEN>(user_id)?);
    payload.put_u8(slot);

    let reply = request(session, AnvizCommand::DownloadTemplate, payload.freeze()).await?;
    reply.expect_echo(AnvizCommand::DownloadTemplate)?;

    if reply.status != Some(anviz_status::SUCCESS) {
        trace!("No template for user {} in slot {}", user_id, slot);
        return Ok(None);
    }

    if reply.payload.len() < TEMPLATE_SIZE {
        return Err(punchwire_core::Error::UnexpectedLength {
            command: AnvizCommand::DownloadTemplate.to_string(),
            expected: TEMPLATE_SIZE,
            actual: reply.payload.len(),
        }
        .into());
    }

    Ok(Some(reply.payload.slice(..TEMPLATE_SIZE)))
}

fn user_block(user: &UserRecord) -> Result<[u8; UPLOAD_USER_LEN]> {
    let mut block = [ABSENT; UPLOAD_USER_LEN];

    block[..5].copy_from_slice(&fields::be_bytes::<USER_ID_LEN>(user.user_id)?);
    if let Some(credential) = &user.credential {
        block[5..8].copy_from_slice(&fields::pack_credential(credential)?);
    }
    if let Some(card) = &user.card {
        block[8..11].copy_from_slice(&fields::pack_card(card)?);
    }

    Ok(block)
}

fn template_payload(template: &Template) -> Result<Bytes> {
    if template.data.len() != TEMPLATE_SIZE {
        return Err(punchwire_core::Error::InvalidTemplateLength {
            len: template.data.len(),
            unit: TEMPLATE_SIZE,
        }
        .into());
    }

    let mut payload = BytesMut::with_capacity(USER_ID_LEN + 1 + TEMPLATE_SIZE);
    payload.put_slice(&fields::be_bytes::<USER_ID_LEN>(template.user_id)?);
    payload.put_u8(template.slot);
    payload.put_slice(&template.data);
    Ok(payload.freeze())
}

fn triple(raw: &[u8], at: usize) -> [u8; 3] {
    [raw[at], raw[at + 1], raw[at + 2]]
}

fn check_stride(raw: &[u8], stride: usize, command: AnvizCommand) -> Result<()> {
    if raw.len() < stride {
        return Err(punchwire_core::Error::UnexpectedLength {
            command: command.to_string(),
            expected: stride,
            actual: raw.len(),
        }
        .into());
    }
    Ok(())
}

/// Decode one 14-byte attendance record
pub fn decode_record<Tz: TimeZone>(raw: &[u8], zone: &Tz, terminal: i64) -> Result<PunchLog> {
    check_stride(raw, RECORD_STRIDE, AnvizCommand::DownloadRecords)?;

    let seconds = fields::read_be(&raw[5..9]);
    let (method, valid) = match raw[9] {
        0 | 1 => (PunchMethod::Fingerprint, true),
        2 => (PunchMethod::Pin, true),
        3 | 8 => (PunchMethod::Card, true),
        _ => (PunchMethod::None, false),
    };
    let timestamp = clock::since_epoch(zone, RECORD_EPOCH, seconds)?;

    Ok(PunchLog {
        user_id: fields::read_be(&raw[0..5]),
        timestamp: clock::to_fixed(&timestamp),
        method,
        work_code: fields::read_be(&raw[11..14]) as u32,
        valid,
        terminal,
        event: None,
    })
}

/// Decode one 30-byte user record
pub fn decode_user(raw: &[u8]) -> Result<UserRecord> {
    check_stride(raw, USER_STRIDE, AnvizCommand::DownloadUsers)?;

    Ok(UserRecord {
        user_id: fields::read_be(&raw[0..5]),
        credential: fields::unpack_credential(triple(raw, 5)),
        card: fields::unpack_card(triple(raw, 8)),
    })
}

struct RecordPages<'z, Tz> {
    zone: &'z Tz,
    terminal: i64,
}

#[async_trait]
impl<'z, Tz: TimeZone + Sync> BatchSource for RecordPages<'z, Tz> {
    type Record = PunchLog;

    async fn fetch(&mut self, session: &mut Session<'_>, first: bool) -> Result<Batch> {
        let reply = request(
            session,
            AnvizCommand::DownloadRecords,
            vec![first as u8, RECORD_BATCH],
        )
        .await?;
        reply.expect_reply(AnvizCommand::DownloadRecords)?;

        Ok(split_batch(&reply.payload, BATCH_RECORDS_OFFSET, RECORD_STRIDE))
    }

    fn decode(&self, raw: &[u8]) -> Result<Option<PunchLog>> {
        decode_record(raw, self.zone, self.terminal).map(Some)
    }

    async fn exhausted(&mut self, session: &mut Session<'_>) -> Result<()> {
        let reply = request(session, AnvizCommand::ClearRecords, CLEAR_RECORDS_ALL.to_vec()).await?;
        reply.expect_reply(AnvizCommand::ClearRecords)?;
        debug!("Cleared device records");
        Ok(())
    }
}

struct UserPages;

#[async_trait]
impl BatchSource for UserPages {
    type Record = UserRecord;

    async fn fetch(&mut self, session: &mut Session<'_>, first: bool) -> Result<Batch> {
        let reply = request(
            session,
            AnvizCommand::DownloadUsers,
            vec![first as u8, USER_BATCH],
        )
        .await?;
        reply.expect_reply(AnvizCommand::DownloadUsers)?;

        Ok(split_batch(&reply.payload, BATCH_RECORDS_OFFSET, USER_STRIDE))
    }

    fn decode(&self, raw: &[u8]) -> Result<Option<UserRecord>> {
        decode_user(raw).map(Some)
    }
}
