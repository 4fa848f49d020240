//! File management and data manipulation

use bytes::Bytes;
use nexum_picc_core::codec::{decode_sint, encode_sint, encode_uint};
use nexum_picc_iso14443::BlockTransport;
use tracing::debug;

use super::{
    CommMode, DesFire, Exchange, FileCommMode, FileSettings, Status,
    constants::{
        ABORT_TRANSACTION, CHANGE_FILE_SETTINGS, CLEAR_RECORD_FILE, COMMIT_TRANSACTION, CREDIT,
        DEBIT, DELETE_FILE, GET_FILE_IDS, GET_FILE_SETTINGS, GET_VALUE, LIMITED_CREDIT, READ_DATA,
        READ_RECORDS, WRITE_DATA, WRITE_RECORD,
    },
};
use crate::{Error, Result};

/// Protection of the data direction for a file's communication mode
const fn data_comm_mode(mode: FileCommMode) -> CommMode {
    match mode {
        FileCommMode::Plain => CommMode::Cmac,
        FileCommMode::Mac => CommMode::SendCmac,
        FileCommMode::Encrypt => CommMode::Encrypt,
    }
}

/// File number, offset and length header of data and record commands
fn io_header(id: u8, offset: u32, length: u32) -> Result<Vec<u8>> {
    let mut header = Vec::with_capacity(7);
    header.push(id);
    encode_uint(&mut header, offset.into(), 3)?;
    encode_uint(&mut header, length.into(), 3)?;
    Ok(header)
}

fn value_operand(delta: i32) -> Result<Vec<u8>> {
    if delta < 0 {
        return Err(Error::InvalidArgument("negative number is not allowed"));
    }
    let mut operand = Vec::with_capacity(4);
    encode_sint(&mut operand, delta.into(), 4)?;
    Ok(operand)
}

impl<B: BlockTransport> DesFire<B> {
    /// Identifiers of all files in the selected application
    pub fn get_file_ids(&mut self) -> Result<Vec<u8>> {
        let response = self.transceive(
            Exchange::new(GET_FILE_IDS)
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        Ok(response.data.to_vec())
    }

    /// Whether file `id` exists in the selected application
    pub fn file_exists(&mut self, id: u8) -> Result<bool> {
        Ok(self.get_file_ids()?.contains(&id))
    }

    /// Settings of file `id`
    pub fn get_file_setting(&mut self, id: u8) -> Result<FileSettings> {
        let response = self.transceive(
            Exchange::new(GET_FILE_SETTINGS)
                .data([id])
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        FileSettings::parse(&response.data)
    }

    /// Change communication mode and access rights of file `id`
    ///
    /// The type-specific part of `settings` is ignored.
    pub fn change_file_setting(&mut self, id: u8, settings: &FileSettings) -> Result<()> {
        let mut data = Vec::with_capacity(3);
        settings.encode_access(&mut data);

        self.transceive(
            Exchange::new(CHANGE_FILE_SETTINGS)
                .plain_data([id])
                .data(data)
                .tx(CommMode::Encrypt)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        Ok(())
    }

    /// Create file `id` in the selected application
    pub fn create_file(&mut self, id: u8, settings: &FileSettings) -> Result<()> {
        let data = settings.encode_create(id)?;

        self.transceive(
            Exchange::new(settings.kind.create_command())
                .data(data)
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        debug!(id, kind = ?settings.kind, "File created");
        Ok(())
    }

    /// Delete file `id`
    pub fn delete_file(&mut self, id: u8) -> Result<()> {
        self.transceive(
            Exchange::new(DELETE_FILE)
                .data([id])
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        Ok(())
    }

    /// Read `length` bytes at `offset` of a data file; 0 reads to the end
    pub fn read_data(&mut self, id: u8, offset: u32, length: u32) -> Result<Bytes> {
        let header = io_header(id, offset, length)?;
        self.read_file(id, READ_DATA, header, length)
    }

    /// Write `data` at `offset` of a data file
    pub fn write_data(&mut self, id: u8, offset: u32, data: &[u8]) -> Result<()> {
        let header = io_header(id, offset, data_length(data)?)?;
        self.write_file(id, WRITE_DATA, header, data.to_vec())
    }

    /// Current value of a value file
    pub fn read_value(&mut self, id: u8) -> Result<i32> {
        let data = self.read_file(id, GET_VALUE, vec![id], 4)?;
        if data.len() != 4 {
            return Err(Error::UnexpectedData("value is not 4 bytes"));
        }
        Ok(decode_sint(&data)? as i32)
    }

    /// Increase a value file by `delta`; takes effect on commit
    pub fn credit_value(&mut self, id: u8, delta: i32) -> Result<()> {
        let operand = value_operand(delta)?;
        self.write_file(id, CREDIT, vec![id], operand)
    }

    /// Decrease a value file by `delta`; takes effect on commit
    pub fn debit_value(&mut self, id: u8, delta: i32) -> Result<()> {
        let operand = value_operand(delta)?;
        self.write_file(id, DEBIT, vec![id], operand)
    }

    /// Increase a value file by at most the limited credit value
    pub fn limited_credit_value(&mut self, id: u8, delta: i32) -> Result<()> {
        let operand = value_operand(delta)?;
        self.write_file(id, LIMITED_CREDIT, vec![id], operand)
    }

    /// Read `count` records starting `offset` records back from the newest;
    /// 0 reads all
    pub fn read_records(&mut self, id: u8, offset: u32, count: u32) -> Result<Bytes> {
        let header = io_header(id, offset, count)?;
        self.read_file(id, READ_RECORDS, header, count)
    }

    /// Write `data` at byte `offset` of the record being written
    pub fn write_record(&mut self, id: u8, offset: u32, data: &[u8]) -> Result<()> {
        let header = io_header(id, offset, data_length(data)?)?;
        self.write_file(id, WRITE_RECORD, header, data.to_vec())
    }

    /// Empty a record file; takes effect on commit
    pub fn clear_record(&mut self, id: u8) -> Result<()> {
        self.transceive(
            Exchange::new(CLEAR_RECORD_FILE)
                .data([id])
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        Ok(())
    }

    /// Validate pending writes to backup, value and record files
    pub fn commit_transaction(&mut self) -> Result<()> {
        self.transceive(
            Exchange::new(COMMIT_TRANSACTION)
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        debug!("Transaction committed");
        Ok(())
    }

    /// Discard pending writes to backup, value and record files
    pub fn abort_transaction(&mut self) -> Result<()> {
        self.transceive(
            Exchange::new(ABORT_TRANSACTION)
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        debug!("Transaction aborted");
        Ok(())
    }

    /// Read from a file, protecting the answer per the file's mode
    ///
    /// `length` counts records for record files.
    fn read_file(&mut self, id: u8, cmd: u8, data: Vec<u8>, length: u32) -> Result<Bytes> {
        let settings = self.get_file_setting(id)?;
        let length = match settings.kind.record_size() {
            Some(record_size) => length.saturating_mul(record_size),
            None => length,
        };

        let response = self.transceive(
            Exchange::new(cmd)
                .data(data)
                .tx(CommMode::Cmac)
                .rx(data_comm_mode(settings.comm_mode))
                .expect(Status::SUCCESS)
                .receive_all()
                .receive_length(length as usize),
        )?;
        Ok(response.data)
    }

    /// Write to a file, protecting the command per the file's mode
    fn write_file(&mut self, id: u8, cmd: u8, plain_data: Vec<u8>, data: Vec<u8>) -> Result<()> {
        let settings = self.get_file_setting(id)?;

        self.transceive(
            Exchange::new(cmd)
                .plain_data(plain_data)
                .data(data)
                .tx(data_comm_mode(settings.comm_mode))
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        Ok(())
    }
}

fn data_length(data: &[u8]) -> Result<u32> {
    u32::try_from(data.len()).map_err(|_| Error::InvalidArgument("data too long"))
}
