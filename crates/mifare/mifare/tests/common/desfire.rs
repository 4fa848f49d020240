//! In-memory DESFire EV1 card
//!
//! Keeps the session key's CBC chain the way a card does: commands with a
//! CMAC are MACed, encrypted commands decrypted, and every answer is MACed or
//! encrypted with the same chained key.

use std::collections::{BTreeMap, VecDeque};

use nexum_mifare::{
    CipherSuite, Key, KeyType,
    desfire::{
        AppId, AppKeyType, FileCommMode, FileKind, FilePermissions, FileSettings, Status,
        constants::*,
    },
};
use nexum_picc_core::Bytes;
use nexum_picc_iso14443::{BlockTransport, Result as TransportResult};

type CardResult<T> = std::result::Result<T, Status>;

/// Card random number for every authentication
const RND_B: [u8; 16] = [
    0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE, 0xBF,
];

/// GetVersion answer of a DESFire EV1 8K
const VERSION: [u8; 28] = [
    0x04, 0x01, 0x01, 0x01, 0x00, 0x1A, 0x05, 0x04, 0x01, 0x01, 0x01, 0x04, 0x1A, 0x05, 0x04, 0x51,
    0x5C, 0xFA, 0x6F, 0x31, 0x80, 0xBA, 0x55, 0x3A, 0x69, 0x50, 0x41, 0x14,
];

#[derive(Debug, Clone, Default)]
struct FileState {
    data: Vec<u8>,
    value: i32,
    records: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct SimFile {
    settings: FileSettings,
    committed: FileState,
    pending: FileState,
}

#[derive(Debug)]
struct SimApp {
    settings: u8,
    key_type: AppKeyType,
    keys: Vec<Key>,
    files: BTreeMap<u8, SimFile>,
}

impl SimApp {
    fn new(settings: u8, key_type: AppKeyType, key_count: u8) -> CardResult<Self> {
        let key = match key_type {
            AppKeyType::Des => Key::new(KeyType::Des, &[0u8; 8], 0),
            AppKeyType::Tdes3k => Key::new(KeyType::Des, &[0u8; 24], 0),
            AppKeyType::Aes => Key::new(KeyType::Aes, &[0u8; 16], 0),
        }
        .map_err(|_| Status::PARAMETER_ERROR)?;

        Ok(Self {
            settings,
            key_type,
            keys: vec![key; usize::from(key_count)],
            files: BTreeMap::new(),
        })
    }
}

/// Key the card derived from the last authentication
#[derive(Debug)]
struct CardSession {
    key_number: u8,
    key: Key,
}

#[derive(Debug)]
struct PendingAuth {
    key_number: u8,
    key: Key,
    rnd_b: Vec<u8>,
}

enum Reply {
    /// Status and data without protection
    Plain(Vec<u8>),
    /// Data followed by a CMAC when authenticated
    Mac(Vec<u8>),
    /// Data and CRC32 encrypted with the session key
    Encrypted(Vec<u8>),
    /// First authentication answer
    Challenge(Vec<u8>),
}

/// Simulated DESFire card speaking native commands
#[derive(Debug)]
pub struct SimulatedDesFire {
    apps: BTreeMap<u32, SimApp>,
    selected: u32,
    session: Option<CardSession>,
    pending_auth: Option<PendingAuth>,
    outgoing: VecDeque<Vec<u8>>,
    /// Flip a bit of the next answer CMAC
    pub corrupt_next_cmac: bool,
    /// Every frame received
    pub frames: Vec<Vec<u8>>,
    /// Set once the reader halted the card
    pub halted: bool,
}

impl SimulatedDesFire {
    /// Factory fresh card with the DES zero PICC master key
    pub fn new() -> Self {
        let mut apps = BTreeMap::new();
        apps.insert(
            0,
            SimApp::new(0x0F, AppKeyType::Des, 1).expect("default PICC master key"),
        );

        Self {
            apps,
            selected: 0,
            session: None,
            pending_auth: None,
            outgoing: VecDeque::new(),
            corrupt_next_cmac: false,
            frames: Vec::new(),
            halted: false,
        }
    }

    /// Whether the card holds a session
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    fn process(&mut self, frame: &[u8]) -> Vec<u8> {
        let Some((&cmd, body)) = frame.split_first() else {
            return vec![Status::LENGTH_ERROR.0];
        };

        let result = if cmd == ADDITIONAL_FRAME {
            if let Some(next) = self.outgoing.pop_front() {
                return next;
            }
            self.finish_auth(body)
        } else {
            self.outgoing.clear();
            self.pending_auth = None;
            self.execute(cmd, frame, body)
        };

        match result {
            Ok(reply) => self.respond(cmd, reply),
            Err(status) => {
                self.session = None;
                self.pending_auth = None;
                vec![status.0]
            }
        }
    }

    fn respond(&mut self, cmd: u8, reply: Reply) -> Vec<u8> {
        let payload = match reply {
            Reply::Challenge(data) => {
                let mut frame = vec![ADDITIONAL_FRAME];
                frame.extend_from_slice(&data);
                return frame;
            }
            Reply::Plain(data) => data,
            Reply::Mac(mut data) => {
                if let Some(session) = self.session.as_mut() {
                    let mut input = data.clone();
                    input.push(Status::SUCCESS.0);
                    let cmac = session.key.calculate_cmac(&input).expect("CMAC");
                    let mut cmac = cmac[..8].to_vec();
                    if std::mem::take(&mut self.corrupt_next_cmac) {
                        cmac[0] ^= 0x01;
                    }
                    data.extend_from_slice(&cmac);
                }
                data
            }
            Reply::Encrypted(mut data) => {
                let session = self.session.as_mut().expect("encrypted answer needs a session");
                let crc = card_crc(&[&data[..], &[Status::SUCCESS.0]]);
                data.extend_from_slice(&crc);
                if data.len() % session.key.block_size() != 0 {
                    data.push(0x80);
                }
                session.key.encrypt(&data).expect("encrypt").to_vec()
            }
        };

        let chunk_size = match cmd {
            GET_VERSION => 7,
            GET_APPLICATION_IDS | READ_DATA | READ_RECORDS => 32,
            _ => usize::MAX,
        };
        let mut frames: VecDeque<Vec<u8>> = payload
            .chunks(chunk_size)
            .map(|chunk| {
                let mut frame = vec![ADDITIONAL_FRAME];
                frame.extend_from_slice(chunk);
                frame
            })
            .collect();
        match frames.back_mut() {
            Some(last) => last[0] = Status::SUCCESS.0,
            None => frames.push_back(vec![Status::SUCCESS.0]),
        }

        let first = frames.pop_front().unwrap_or_default();
        self.outgoing = frames;
        first
    }

    fn execute(&mut self, cmd: u8, frame: &[u8], body: &[u8]) -> CardResult<Reply> {
        match cmd {
            AUTHENTICATE_DES | AUTHENTICATE_AES => self.start_auth(cmd, body),
            SELECT_APPLICATION => {
                let id = app_id(body)?;
                if !self.apps.contains_key(&id) {
                    return Err(Status::APPLICATION_NOT_FOUND);
                }
                self.selected = id;
                self.session = None;
                Ok(Reply::Plain(Vec::new()))
            }
            CHANGE_KEY => self.change_key(body),
            CHANGE_KEY_SETTINGS => {
                let data = self.decrypt_command(frame, 1, 1)?;
                self.app_mut()?.settings = data[0];
                Ok(Reply::Mac(Vec::new()))
            }
            CHANGE_FILE_SETTINGS => {
                let id = *body.first().ok_or(Status::LENGTH_ERROR)?;
                let data = self.decrypt_command(frame, 2, 3)?;
                let file = self.file_mut(id)?;
                file.settings.comm_mode =
                    FileCommMode::from_byte(data[0]).map_err(|_| Status::PARAMETER_ERROR)?;
                file.settings.permissions =
                    FilePermissions::from(u16::from_le_bytes([data[1], data[2]]));
                Ok(Reply::Mac(Vec::new()))
            }
            WRITE_DATA | WRITE_RECORD | CREDIT | DEBIT | LIMITED_CREDIT => self.write(cmd, frame, body),
            _ => {
                if let Some(session) = self.session.as_mut() {
                    session.key.calculate_cmac(frame).expect("CMAC");
                }
                self.execute_maced(cmd, body)
            }
        }
    }

    fn start_auth(&mut self, cmd: u8, body: &[u8]) -> CardResult<Reply> {
        self.session = None;
        let key_number = *body.first().ok_or(Status::LENGTH_ERROR)?;
        let mut key = self
            .app()?
            .keys
            .get(usize::from(key_number))
            .ok_or(Status::NO_SUCH_KEY)?
            .clone();

        let expected_cmd = match key.key_type() {
            KeyType::Des => AUTHENTICATE_DES,
            KeyType::Aes => AUTHENTICATE_AES,
        };
        if cmd != expected_cmd {
            return Err(Status::AUTHENTICATION_ERROR);
        }

        let rnd_b = RND_B[..challenge_length(&key)].to_vec();
        key.clear_iv();
        let challenge = key.encrypt(&rnd_b).expect("encrypt").to_vec();
        self.pending_auth = Some(PendingAuth {
            key_number,
            key,
            rnd_b,
        });
        Ok(Reply::Challenge(challenge))
    }

    fn finish_auth(&mut self, token: &[u8]) -> CardResult<Reply> {
        let mut pending = self.pending_auth.take().ok_or(Status::ILLEGAL_COMMAND)?;
        let length = challenge_length(&pending.key);
        if token.len() != 2 * length {
            return Err(Status::LENGTH_ERROR);
        }

        let plain = pending.key.decrypt(token).map_err(|_| Status::LENGTH_ERROR)?;
        let (rnd_a, rnd_b_rotated) = plain.split_at(length);
        let mut expected = pending.rnd_b.clone();
        expected.rotate_left(1);
        if rnd_b_rotated != &expected[..] {
            return Err(Status::AUTHENTICATION_ERROR);
        }

        let mut rnd_a_rotated = rnd_a.to_vec();
        rnd_a_rotated.rotate_left(1);
        let proof = pending.key.encrypt(&rnd_a_rotated).expect("encrypt").to_vec();

        self.session = Some(CardSession {
            key_number: pending.key_number,
            key: session_key(&pending.key, rnd_a, &pending.rnd_b)?,
        });
        Ok(Reply::Plain(proof))
    }

    fn change_key(&mut self, body: &[u8]) -> CardResult<Reply> {
        let (&key_no, encrypted) = body.split_first().ok_or(Status::LENGTH_ERROR)?;
        let key_number = key_no & 0x0F;
        let key_type = if self.selected == 0 {
            AppKeyType::from_bits(key_no).map_err(|_| Status::PARAMETER_ERROR)?
        } else {
            self.app()?.key_type
        };

        let session = self.session.as_mut().ok_or(Status::AUTHENTICATION_ERROR)?;
        let same_key = key_number == session.key_number;
        let plain = session
            .key
            .decrypt(encrypted)
            .map_err(|_| Status::LENGTH_ERROR)?;

        let key_length = if key_type == AppKeyType::Tdes3k { 24 } else { 16 };
        let versioned = key_length + usize::from(key_type == AppKeyType::Aes);
        let needed = versioned + if same_key { 4 } else { 8 };
        if plain.len() < needed {
            return Err(Status::LENGTH_ERROR);
        }

        let crc = card_crc(&[&[CHANGE_KEY, key_no], &plain[..versioned]]);
        if plain[versioned..versioned + 4] != crc {
            return Err(Status::INTEGRITY_ERROR);
        }

        let mut new_key = plain[..key_length].to_vec();
        if !same_key {
            let current = self
                .app()?
                .keys
                .get(usize::from(key_number))
                .ok_or(Status::NO_SUCH_KEY)?;
            for (byte, current) in new_key.iter_mut().zip(current.key_bytes()) {
                *byte ^= current;
            }
            if plain[versioned + 4..versioned + 8] != card_crc(&[&new_key]) {
                return Err(Status::INTEGRITY_ERROR);
            }
        }

        let key = match key_type {
            AppKeyType::Aes => Key::new(KeyType::Aes, &new_key, plain[key_length]),
            _ => Key::new(KeyType::Des, &new_key, parity_version(&new_key)),
        }
        .map_err(|_| Status::PARAMETER_ERROR)?;

        let picc_level = self.selected == 0;
        let app = self.app_mut()?;
        let slot = app
            .keys
            .get_mut(usize::from(key_number))
            .ok_or(Status::NO_SUCH_KEY)?;
        *slot = key;
        if picc_level {
            app.key_type = key_type;
        }

        if same_key {
            self.session = None;
        }
        Ok(Reply::Mac(Vec::new()))
    }

    fn execute_maced(&mut self, cmd: u8, body: &[u8]) -> CardResult<Reply> {
        match cmd {
            GET_KEY_SETTINGS => {
                let app = self.app()?;
                Ok(Reply::Mac(vec![
                    app.settings,
                    app.keys.len() as u8 | app.key_type.bits(),
                ]))
            }
            GET_KEY_VERSION => {
                let key_number = *body.first().ok_or(Status::LENGTH_ERROR)?;
                let key = self
                    .app()?
                    .keys
                    .get(usize::from(key_number))
                    .ok_or(Status::NO_SUCH_KEY)?;
                Ok(Reply::Mac(vec![key.version()]))
            }
            CREATE_APPLICATION => {
                self.require_picc_master()?;
                let [a, b, c, settings, keys] = body[..] else {
                    return Err(Status::LENGTH_ERROR);
                };
                let id = AppId::from_bytes([a, b, c]).value();
                if self.apps.contains_key(&id) {
                    return Err(Status::DUPLICATE_ERROR);
                }
                let key_type = AppKeyType::from_bits(keys).map_err(|_| Status::PARAMETER_ERROR)?;
                self.apps.insert(id, SimApp::new(settings, key_type, keys & 0x0F)?);
                Ok(Reply::Mac(Vec::new()))
            }
            DELETE_APPLICATION => {
                self.require_picc_master()?;
                let id = app_id(body)?;
                if id == 0 || self.apps.remove(&id).is_none() {
                    return Err(Status::APPLICATION_NOT_FOUND);
                }
                Ok(Reply::Mac(Vec::new()))
            }
            GET_APPLICATION_IDS => Ok(Reply::Mac(
                self.apps
                    .keys()
                    .filter(|&&id| id != 0)
                    .flat_map(|&id| le24(id))
                    .collect(),
            )),
            GET_VERSION => Ok(Reply::Mac(VERSION.to_vec())),
            FORMAT_PICC => {
                self.require_picc_master()?;
                self.apps.retain(|&id, _| id == 0);
                Ok(Reply::Mac(Vec::new()))
            }
            GET_FILE_IDS => Ok(Reply::Mac(self.app()?.files.keys().copied().collect())),
            GET_FILE_SETTINGS => {
                let id = *body.first().ok_or(Status::LENGTH_ERROR)?;
                let file = self.file(id)?;
                let mut settings = vec![file.settings.kind.type_byte()];
                let encoded = file
                    .settings
                    .encode_create(id)
                    .map_err(|_| Status::PARAMETER_ERROR)?;
                settings.extend_from_slice(&encoded[1..]);
                if file.settings.kind.record_size().is_some() {
                    settings.extend_from_slice(&le24(file.committed.records.len() as u32));
                }
                Ok(Reply::Mac(settings))
            }
            CREATE_STD_DATA_FILE
            | CREATE_BACKUP_DATA_FILE
            | CREATE_VALUE_FILE
            | CREATE_LINEAR_RECORD_FILE
            | CREATE_CYCLIC_RECORD_FILE => self.create_file(cmd, body),
            DELETE_FILE => {
                let id = *body.first().ok_or(Status::LENGTH_ERROR)?;
                self.app_mut()?
                    .files
                    .remove(&id)
                    .ok_or(Status::FILE_NOT_FOUND)?;
                Ok(Reply::Mac(Vec::new()))
            }
            READ_DATA => {
                let (id, offset, length) = io_header(body)?;
                let file = self.file(id)?;
                let data = &file.committed.data;
                let end = if length == 0 { data.len() } else { offset + length };
                let data = data.get(offset..end).ok_or(Status::BOUNDARY_ERROR)?.to_vec();
                self.read_reply(file.settings.comm_mode, data)
            }
            GET_VALUE => {
                let id = *body.first().ok_or(Status::LENGTH_ERROR)?;
                let file = self.file(id)?;
                let data = file.committed.value.to_le_bytes().to_vec();
                self.read_reply(file.settings.comm_mode, data)
            }
            READ_RECORDS => {
                let (id, offset, count) = io_header(body)?;
                let file = self.file(id)?;
                let records = &file.committed.records;
                if offset >= records.len() {
                    return Err(Status::BOUNDARY_ERROR);
                }
                let available = records.len() - offset;
                let count = if count == 0 { available } else { count };
                if count > available {
                    return Err(Status::BOUNDARY_ERROR);
                }
                let data = records[available - count..available].concat();
                self.read_reply(file.settings.comm_mode, data)
            }
            CLEAR_RECORD_FILE => {
                let id = *body.first().ok_or(Status::LENGTH_ERROR)?;
                self.file_mut(id)?.pending.records.clear();
                Ok(Reply::Mac(Vec::new()))
            }
            COMMIT_TRANSACTION => {
                for file in self.app_mut()?.files.values_mut() {
                    file.committed = file.pending.clone();
                }
                Ok(Reply::Mac(Vec::new()))
            }
            ABORT_TRANSACTION => {
                for file in self.app_mut()?.files.values_mut() {
                    file.pending = file.committed.clone();
                }
                Ok(Reply::Mac(Vec::new()))
            }
            _ => Err(Status::ILLEGAL_COMMAND),
        }
    }

    fn create_file(&mut self, cmd: u8, body: &[u8]) -> CardResult<Reply> {
        let (&id, rest) = body.split_first().ok_or(Status::LENGTH_ERROR)?;
        let file_type = match cmd {
            CREATE_STD_DATA_FILE => 0x00,
            CREATE_BACKUP_DATA_FILE => 0x01,
            CREATE_VALUE_FILE => 0x02,
            CREATE_LINEAR_RECORD_FILE => 0x03,
            _ => 0x04,
        };
        let mut encoded = vec![file_type];
        encoded.extend_from_slice(rest);
        if file_type >= 0x03 {
            encoded.extend_from_slice(&[0x00; 3]);
        }
        let settings = FileSettings::parse(&encoded).map_err(|_| Status::PARAMETER_ERROR)?;

        let mut state = FileState::default();
        if let FileKind::StdData { size } | FileKind::BackupData { size } = settings.kind {
            state.data = vec![0x00; size as usize];
        }

        let app = self.app_mut()?;
        if app.files.contains_key(&id) {
            return Err(Status::DUPLICATE_ERROR);
        }
        app.files.insert(
            id,
            SimFile {
                settings,
                committed: state.clone(),
                pending: state,
            },
        );
        Ok(Reply::Mac(Vec::new()))
    }

    fn write(&mut self, cmd: u8, frame: &[u8], body: &[u8]) -> CardResult<Reply> {
        let id = *body.first().ok_or(Status::LENGTH_ERROR)?;
        let header = if matches!(cmd, WRITE_DATA | WRITE_RECORD) { 8 } else { 2 };
        if frame.len() < header {
            return Err(Status::LENGTH_ERROR);
        }

        let mode = self.file(id)?.settings.comm_mode;
        let data = match mode {
            FileCommMode::Plain => {
                if let Some(session) = self.session.as_mut() {
                    session.key.calculate_cmac(frame).expect("CMAC");
                }
                frame[header..].to_vec()
            }
            FileCommMode::Mac => match self.session.as_mut() {
                Some(session) => {
                    let (command, cmac) = frame.split_at(frame.len().saturating_sub(8).max(header));
                    let expected = session.key.calculate_cmac(command).expect("CMAC");
                    if cmac != &expected[..8] {
                        return Err(Status::INTEGRITY_ERROR);
                    }
                    command[header..].to_vec()
                }
                None => frame[header..].to_vec(),
            },
            FileCommMode::Encrypt => {
                let length = if header == 8 { le24_at(frame, 5) } else { 4 };
                self.decrypt_command(frame, header, length)?
            }
        };

        let file = self.file_mut(id)?;
        match cmd {
            WRITE_DATA => {
                let offset = le24_at(frame, 2);
                let target = file
                    .pending
                    .data
                    .get_mut(offset..offset + data.len())
                    .ok_or(Status::BOUNDARY_ERROR)?;
                target.copy_from_slice(&data);
                if matches!(file.settings.kind, FileKind::StdData { .. }) {
                    file.committed.data = file.pending.data.clone();
                }
            }
            WRITE_RECORD => {
                let offset = le24_at(frame, 2);
                let (record_size, max_records, cyclic) = match file.settings.kind {
                    FileKind::LinearRecord {
                        record_size,
                        max_records,
                        ..
                    } => (record_size, max_records, false),
                    FileKind::CyclicRecord {
                        record_size,
                        max_records,
                        ..
                    } => (record_size, max_records, true),
                    _ => return Err(Status::PARAMETER_ERROR),
                };
                if file.pending.records.len() == file.committed.records.len() {
                    if file.pending.records.len() >= max_records as usize {
                        if !cyclic {
                            return Err(Status::BOUNDARY_ERROR);
                        }
                        file.pending.records.remove(0);
                    }
                    file.pending.records.push(vec![0x00; record_size as usize]);
                }
                let record = file.pending.records.last_mut().ok_or(Status::BOUNDARY_ERROR)?;
                record
                    .get_mut(offset..offset + data.len())
                    .ok_or(Status::BOUNDARY_ERROR)?
                    .copy_from_slice(&data);
            }
            _ => {
                let FileKind::Value { lower_limit, upper_limit, .. } = file.settings.kind else {
                    return Err(Status::PARAMETER_ERROR);
                };
                let operand = data
                    .get(..4)
                    .and_then(|bytes| bytes.try_into().ok())
                    .map(i32::from_le_bytes)
                    .ok_or(Status::LENGTH_ERROR)?;
                let value = if cmd == DEBIT {
                    file.pending.value.checked_sub(operand)
                } else {
                    file.pending.value.checked_add(operand)
                }
                .ok_or(Status::BOUNDARY_ERROR)?;
                if value < lower_limit || value > upper_limit {
                    return Err(Status::BOUNDARY_ERROR);
                }
                file.pending.value = value;
            }
        }
        Ok(Reply::Mac(Vec::new()))
    }

    fn read_reply(&self, mode: FileCommMode, data: Vec<u8>) -> CardResult<Reply> {
        match mode {
            FileCommMode::Encrypt if self.session.is_none() => Err(Status::PERMISSION_DENIED),
            FileCommMode::Encrypt => Ok(Reply::Encrypted(data)),
            _ => Ok(Reply::Mac(data)),
        }
    }

    /// Decrypt the payload after `header` bytes and check its CRC32
    fn decrypt_command(&mut self, frame: &[u8], header: usize, length: usize) -> CardResult<Vec<u8>> {
        let session = self.session.as_mut().ok_or(Status::AUTHENTICATION_ERROR)?;
        let encrypted = frame.get(header..).ok_or(Status::LENGTH_ERROR)?;
        let plain = session
            .key
            .decrypt(encrypted)
            .map_err(|_| Status::LENGTH_ERROR)?;
        if plain.len() < length + 4 {
            return Err(Status::LENGTH_ERROR);
        }

        let (data, rest) = plain.split_at(length);
        if rest[..4] != card_crc(&[&frame[..header], data]) {
            return Err(Status::INTEGRITY_ERROR);
        }
        Ok(data.to_vec())
    }

    fn require_picc_master(&self) -> CardResult<()> {
        match &self.session {
            Some(session) if self.selected == 0 && session.key_number == 0 => Ok(()),
            _ => Err(Status::AUTHENTICATION_ERROR),
        }
    }

    fn app(&self) -> CardResult<&SimApp> {
        self.apps.get(&self.selected).ok_or(Status::APPLICATION_NOT_FOUND)
    }

    fn app_mut(&mut self) -> CardResult<&mut SimApp> {
        self.apps
            .get_mut(&self.selected)
            .ok_or(Status::APPLICATION_NOT_FOUND)
    }

    fn file(&self, id: u8) -> CardResult<&SimFile> {
        self.app()?.files.get(&id).ok_or(Status::FILE_NOT_FOUND)
    }

    fn file_mut(&mut self, id: u8) -> CardResult<&mut SimFile> {
        self.app_mut()?
            .files
            .get_mut(&id)
            .ok_or(Status::FILE_NOT_FOUND)
    }
}

impl BlockTransport for SimulatedDesFire {
    fn do_transceive(&mut self, data: &[u8]) -> TransportResult<Bytes> {
        self.frames.push(data.to_vec());
        Ok(Bytes::from(self.process(data)))
    }

    fn max_inf_size(&self) -> usize {
        250
    }

    fn deselect(&mut self) -> TransportResult<()> {
        self.session = None;
        Ok(())
    }

    fn halt(&mut self) -> TransportResult<()> {
        self.session = None;
        self.halted = true;
        Ok(())
    }
}

/// Session key assembled from the halves of both random numbers
fn session_key(auth_key: &Key, a: &[u8], b: &[u8]) -> CardResult<Key> {
    let bytes = match auth_key.cipher_suite() {
        CipherSuite::Des => [&a[0..4], &b[0..4]].concat(),
        CipherSuite::TdesEde2 => [&a[0..4], &b[0..4], &a[4..8], &b[4..8]].concat(),
        CipherSuite::TdesEde3 => {
            [&a[0..4], &b[0..4], &a[6..10], &b[6..10], &a[12..16], &b[12..16]].concat()
        }
        CipherSuite::Aes128 => [&a[0..4], &b[0..4], &a[12..16], &b[12..16]].concat(),
    };
    Key::new(auth_key.key_type(), &bytes, 0).map_err(|_| Status::AUTHENTICATION_ERROR)
}

/// CRC32 the card appends: reflected 0xEDB88320, preset all ones, no final inversion
fn card_crc(parts: &[&[u8]]) -> [u8; 4] {
    let crc = parts.iter().flat_map(|part| part.iter()).fold(u32::MAX, |crc, &byte| {
        (0..8).fold(crc ^ u32::from(byte), |crc, _| {
            if crc & 1 == 1 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            }
        })
    });
    crc.to_le_bytes()
}

fn challenge_length(key: &Key) -> usize {
    match key.cipher_suite() {
        CipherSuite::Des | CipherSuite::TdesEde2 => 8,
        _ => 16,
    }
}

fn parity_version(key: &[u8]) -> u8 {
    key.iter()
        .take(8)
        .enumerate()
        .fold(0, |version, (index, byte)| version | ((byte & 0x01) << (7 - index)))
}

fn app_id(body: &[u8]) -> CardResult<u32> {
    let [a, b, c] = body[..] else {
        return Err(Status::LENGTH_ERROR);
    };
    Ok(AppId::from_bytes([a, b, c]).value())
}

fn io_header(body: &[u8]) -> CardResult<(u8, usize, usize)> {
    if body.len() < 7 {
        return Err(Status::LENGTH_ERROR);
    }
    Ok((body[0], le24_at(body, 1), le24_at(body, 4)))
}

fn le24_at(data: &[u8], offset: usize) -> usize {
    usize::from(data[offset]) | usize::from(data[offset + 1]) << 8 | usize::from(data[offset + 2]) << 16
}

fn le24(value: u32) -> [u8; 3] {
    let [a, b, c, _] = value.to_le_bytes();
    [a, b, c]
}
