//! Authentication, application and key management

use nexum_picc_iso14443::BlockTransport;
use rand::{RngCore, rng};
use tracing::{debug, warn};

use super::{
    AppId, AppKeyType, CardVersion, CommMode, DesFire, Exchange, KeySettingInfo, KeySettings,
    Session, Status,
    constants::{
        ADDITIONAL_FRAME, AUTHENTICATE_AES, AUTHENTICATE_DES, CHANGE_KEY, CHANGE_KEY_SETTINGS,
        CREATE_APPLICATION, DELETE_APPLICATION, FORMAT_PICC, GET_APPLICATION_IDS,
        GET_KEY_SETTINGS, GET_KEY_VERSION, GET_VERSION, MAX_KEY_COUNT, MAX_KEY_NUMBER,
        SELECT_APPLICATION,
    },
};
use crate::{CipherSuite, Error, Key, KeyType, Result, crc::crc32};

impl<B: BlockTransport> DesFire<B> {
    /// Mutual authentication with key `key_number` of the selected application
    ///
    /// Returns `false` and halts the card when the card's proof does not
    /// match. A key the card rejects is a [`Error::ReceiptStatus`].
    pub fn auth(&mut self, key_number: u8, key: &Key) -> Result<bool> {
        let mut rnd_a = [0u8; 16];
        rng().fill_bytes(&mut rnd_a);
        self.auth_with(key_number, key, &rnd_a)
    }

    /// Authentication with the reader's random number `rnd_a`
    fn auth_with(&mut self, key_number: u8, key: &Key, rnd_a: &[u8; 16]) -> Result<bool> {
        self.invalidate();

        let mut auth_key = key.clone();
        auth_key.clear_iv();

        let cmd = match auth_key.key_type() {
            KeyType::Des => AUTHENTICATE_DES,
            KeyType::Aes => AUTHENTICATE_AES,
        };
        debug!(key_number, cipher_suite = ?auth_key.cipher_suite(), "Authenticating");

        let challenge = self
            .transceive(
                Exchange::new(cmd)
                    .data([key_number])
                    .expect(Status::ADDITIONAL_FRAME),
            )?
            .data;

        let challenge_length = match auth_key.cipher_suite() {
            CipherSuite::Des | CipherSuite::TdesEde2 => 8,
            CipherSuite::TdesEde3 | CipherSuite::Aes128 => 16,
        };
        if challenge.len() != challenge_length {
            return Err(Error::UnexpectedData("challenge length does not match key"));
        }

        let rnd_b = auth_key.decrypt(&challenge)?;
        let mut rnd_b_rotated = rnd_b.to_vec();
        rnd_b_rotated.rotate_left(1);

        let rnd_a = &rnd_a[..challenge_length];
        let mut token = rnd_a.to_vec();
        token.extend_from_slice(&rnd_b_rotated);
        let token = auth_key.encrypt(&token)?;

        let proof = self
            .transceive(
                Exchange::new(ADDITIONAL_FRAME)
                    .data(token.to_vec())
                    .expect(Status::SUCCESS),
            )?
            .data;
        if proof.len() != challenge_length {
            return Err(Error::UnexpectedData("proof length does not match key"));
        }

        let verification = auth_key.decrypt(&proof)?;
        let mut rnd_a_rotated = rnd_a.to_vec();
        rnd_a_rotated.rotate_left(1);

        if verification[..] != rnd_a_rotated[..] {
            warn!(key_number, "Card proof did not match, halting");
            if let Err(e) = self.transport.halt() {
                debug!(error = %e, "Ignoring halt failure");
            }
            return Ok(false);
        }

        self.session = Some(Session::derive(key_number, &auth_key, rnd_a, &rnd_b)?);
        debug!(key_number, "Authenticated");
        Ok(true)
    }

    /// Identifiers of all applications on the card
    pub fn get_app_ids(&mut self) -> Result<Vec<AppId>> {
        let data = self
            .transceive(
                Exchange::new(GET_APPLICATION_IDS)
                    .tx(CommMode::Cmac)
                    .rx(CommMode::Cmac)
                    .expect(Status::SUCCESS)
                    .receive_all(),
            )?
            .data;

        if data.len() % 3 != 0 {
            return Err(Error::UnexpectedData("application list not a multiple of 3"));
        }

        Ok(data
            .chunks_exact(3)
            .map(|id| AppId::from_bytes([id[0], id[1], id[2]]))
            .collect())
    }

    /// Whether application `id` exists
    pub fn app_exists(&mut self, id: AppId) -> Result<bool> {
        Ok(self.get_app_ids()?.contains(&id))
    }

    /// Select an application; the session ends
    pub fn select_app(&mut self, id: AppId) -> Result<()> {
        self.transceive(
            Exchange::new(SELECT_APPLICATION)
                .data(id.to_bytes())
                .expect(Status::SUCCESS),
        )?;

        self.invalidate();
        self.selected_app = Some(id);
        debug!(app = %id, "Application selected");
        Ok(())
    }

    /// Create an application holding `key_count` keys of `key_type`
    pub fn create_app(
        &mut self,
        id: AppId,
        settings: KeySettings,
        key_count: u8,
        key_type: AppKeyType,
    ) -> Result<()> {
        self.require_session()?;
        if key_count > MAX_KEY_COUNT {
            return Err(Error::InvalidArgument(
                "an application can only hold up to 14 keys",
            ));
        }

        let mut data = id.to_bytes().to_vec();
        data.push(settings.into());
        data.push(key_count | key_type.bits());

        self.transceive(
            Exchange::new(CREATE_APPLICATION)
                .data(data)
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        debug!(app = %id, key_count, ?key_type, "Application created");
        Ok(())
    }

    /// Delete an application
    pub fn delete_app(&mut self, id: AppId) -> Result<()> {
        self.require_session()?;

        self.transceive(
            Exchange::new(DELETE_APPLICATION)
                .data(id.to_bytes())
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        Ok(())
    }

    /// Manufacturing data of the card
    pub fn get_card_version(&mut self) -> Result<CardVersion> {
        let data = self
            .transceive(
                Exchange::new(GET_VERSION)
                    .tx(CommMode::Cmac)
                    .rx(CommMode::Cmac)
                    .expect(Status::SUCCESS)
                    .receive_all(),
            )?
            .data;

        CardVersion::parse(&data)
    }

    /// Delete all applications and files
    pub fn format_card(&mut self) -> Result<()> {
        self.require_session()?;

        self.transceive(
            Exchange::new(FORMAT_PICC)
                .tx(CommMode::Cmac)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        debug!("Card formatted");
        Ok(())
    }

    /// Version of key `key_number`
    pub fn get_key_version(&mut self, key_number: u8) -> Result<u8> {
        let data = self
            .transceive(
                Exchange::new(GET_KEY_VERSION)
                    .data([key_number])
                    .tx(CommMode::Cmac)
                    .rx(CommMode::Cmac)
                    .expect(Status::SUCCESS),
            )?
            .data;

        data.first()
            .copied()
            .ok_or(Error::UnexpectedData("empty key version"))
    }

    /// Replace key `key_number` with `new_key`
    ///
    /// `current_key` is needed unless the key being changed is the one the
    /// session was authenticated with. Changing that key ends the session.
    pub fn change_key(
        &mut self,
        key_number: u8,
        new_key: &Key,
        current_key: Option<&Key>,
    ) -> Result<()> {
        let authenticated_key = self.require_session()?.key_number();
        if key_number > MAX_KEY_NUMBER {
            return Err(Error::InvalidArgument("invalid key number"));
        }

        let same_key = key_number == authenticated_key;

        // Only the PICC master key carries its type in the key number
        let mut key_no = key_number;
        if self.selected_app.unwrap_or(AppId::PICC) == AppId::PICC {
            key_no |= AppKeyType::from(new_key.cipher_suite()).bits();
        }

        let mut cryptogram = new_key.key_bytes().to_vec();
        if !same_key {
            let current = current_key.ok_or(Error::InvalidArgument(
                "changing another key needs its current value",
            ))?;
            if current.key_bytes().len() != cryptogram.len() {
                return Err(Error::InvalidKey("current and new key differ in size"));
            }
            for (byte, current) in cryptogram.iter_mut().zip(current.key_bytes()) {
                *byte ^= current;
            }
        }

        if new_key.key_type() == KeyType::Aes {
            cryptogram.push(new_key.version());
        }

        let crc = crc32(&[&[CHANGE_KEY, key_no], &cryptogram[..]]);
        cryptogram.extend_from_slice(&crc.to_le_bytes());

        if !same_key {
            let crc = crc32(&[new_key.key_bytes()]);
            cryptogram.extend_from_slice(&crc.to_le_bytes());
        }

        let session = self.session.as_mut().ok_or(Error::Unauthenticated)?;
        let mut data = vec![key_no];
        data.extend_from_slice(&session.key_mut().encrypt(&cryptogram)?);

        if same_key {
            self.invalidate();
        }

        self.transceive(
            Exchange::new(CHANGE_KEY)
                .data(data)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        debug!(key_number, same_key, "Key changed");
        Ok(())
    }

    /// Master key settings of the selected application or PICC
    pub fn get_key_setting(&mut self) -> Result<KeySettingInfo> {
        let data = self
            .transceive(
                Exchange::new(GET_KEY_SETTINGS)
                    .tx(CommMode::Cmac)
                    .rx(CommMode::Cmac)
                    .expect(Status::SUCCESS),
            )?
            .data;

        let [settings, keys, ..] = data[..] else {
            return Err(Error::UnexpectedData("key settings too short"));
        };

        Ok(KeySettingInfo {
            settings: KeySettings::from(settings),
            key_count: keys & 0x0F,
            key_type: AppKeyType::from_bits(keys)?,
        })
    }

    /// Change the master key settings
    pub fn change_key_setting(&mut self, settings: KeySettings) -> Result<()> {
        self.require_session()?;

        self.transceive(
            Exchange::new(CHANGE_KEY_SETTINGS)
                .data([u8::from(settings)])
                .tx(CommMode::Encrypt)
                .rx(CommMode::Cmac)
                .expect(Status::SUCCESS),
        )?;
        Ok(())
    }
}
