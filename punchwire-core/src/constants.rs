//! Protocol constants

/// Default connection timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 5;

/// Default read timeout (seconds)
pub const DEFAULT_READ_TIMEOUT: u64 = 5;

/// Anviz terminal layouts
pub mod anviz {
    /// Factory TCP port
    pub const DEFAULT_PORT: u16 = 5010;

    /// Width of a user id on the wire
    pub const USER_ID_LEN: usize = 5;

    /// Size of one fingerprint template
    pub const TEMPLATE_SIZE: usize = 338;

    /// Fingerprint slots (backup codes) per user
    pub const TEMPLATE_SLOTS: [u8; 2] = [1, 2];

    /// Stride of one attendance record in a download batch
    pub const RECORD_STRIDE: usize = 14;

    /// Stride of one user in a download batch
    pub const USER_STRIDE: usize = 30;

    /// Batch size parameter of the record download request
    pub const RECORD_BATCH: u8 = 0x19;

    /// Batch size parameter of the user download request
    pub const USER_BATCH: u8 = 0x12;

    /// Size of one user block in an upload frame
    pub const UPLOAD_USER_LEN: usize = 27;

    /// Users per upload frame
    pub const UPLOAD_USERS_PER_FRAME: usize = 12;

    /// Payload of the clear-records command
    pub const CLEAR_RECORDS_ALL: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

    /// Offset of the first sub-record in a batch payload (after the count byte)
    pub const BATCH_RECORDS_OFFSET: usize = 1;

    /// Local calendar date the record clock counts seconds from
    ///
    /// The vendor documents 2000-01-01; devices in the field count from
    /// 2000-01-02.
    pub const RECORD_EPOCH: (i32, u32, u32) = (2000, 1, 2);
}

/// Soyal terminal layouts
pub mod soyal {
    /// Factory TCP port
    pub const DEFAULT_PORT: u16 = 1621;

    /// Size of a single fingerprint template unit
    pub const TEMPLATE_SIZE: usize = 384;

    /// Size of a double fingerprint template
    pub const DOUBLE_TEMPLATE_SIZE: usize = TEMPLATE_SIZE * 2;

    /// Slot used when storing the combined template blob
    pub const TEMPLATE_SLOT: u8 = 0;

    /// Minimum data bytes of an event log reply
    pub const LOG_DATA_LEN: usize = 26;

    /// Minimum data bytes of a clock reply
    pub const CLOCK_DATA_LEN: usize = 8;
}
