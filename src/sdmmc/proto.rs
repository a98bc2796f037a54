//! blackbox-sdspi - Constants from the SD Specifications
//!
//! Command indices, R1 status bits and data tokens for SD/MMC cards running
//! in SPI mode.

//==============================================================================

// SD Card Commands

/// GO_IDLE_STATE - init card in spi mode if CS low
pub const CMD0: u8 = 0x00;
/// SEND_IF_COND - verify SD Memory Card interface operating condition
pub const CMD8: u8 = 0x08;
/// STOP_TRANSMISSION - end multiple block read sequence
pub const CMD12: u8 = 0x0C;
/// READ_SINGLE_BLOCK - read a single data block from the card
pub const CMD17: u8 = 0x11;
/// WRITE_BLOCK - write a single data block to the card
pub const CMD24: u8 = 0x18;
/// APP_CMD - escape for application specific command
pub const CMD55: u8 = 0x37;
/// READ_OCR - read the OCR register of a card
pub const CMD58: u8 = 0x3A;
/// SD_SEND_OP_COMD - Sends host capacity support information and activates
/// the card's initialization process
pub const ACMD41: u8 = 0x29;

/// Every command byte on the wire is `01xx_xxxx`.
pub const CMD_START: u8 = 0x40;

//==============================================================================

// Fixed CRC bytes. CRC checking is off in SPI mode except for CMD0 and CMD8.

/// CRC7 plus end bit for CMD0 with argument 0
pub const CRC_CMD0: u8 = 0x95;
/// CRC7 plus end bit for CMD8 with argument 0x1AA
pub const CRC_CMD8: u8 = 0x87;
/// Placeholder sent with every other command (just the end bit)
pub const CRC_PLACEHOLDER: u8 = 0x01;

//==============================================================================

/// CMD8 argument: 2.7-3.6V supply, check pattern 0xAA
pub const CMD8_VOLTAGE_CHECK: u32 = 0x0000_01AA;
/// The check pattern the card must echo back in its R7 response
pub const CMD8_CHECK_PATTERN: u8 = 0xAA;
/// ACMD41 argument: host supports high capacity cards
pub const ACMD41_HCS: u32 = 0x4000_0000;
/// Card Capacity Status bit in the first byte of the OCR
pub const OCR_CCS: u8 = 0x40;

//==============================================================================

/// status for card in the ready state
pub const R1_READY_STATE: u8 = 0x00;

/// status for card in the idle state
pub const R1_IDLE_STATE: u8 = 0x01;

/// set while the card hasn't answered yet
pub const R1_NO_RESPONSE: u8 = 0x80;

/// what the bus floats to when nothing is driving it
pub const IDLE_BYTE: u8 = 0xFF;

/// what a busy card holds the bus at while programming flash
pub const BUSY_BYTE: u8 = 0x00;

/// start data token for read or write single block
pub const DATA_START_BLOCK: u8 = 0xFE;

/// mask for data response tokens after a write block operation
pub const DATA_RES_MASK: u8 = 0x1F;

/// write data accepted token
pub const DATA_RES_ACCEPTED: u8 = 0x05;

//==============================================================================

/// How many bytes we poll for an R1 response
pub const COMMAND_POLL_LIMIT: usize = 200;

/// How many bytes we poll for the start of a data block
pub const READ_TOKEN_POLL_LIMIT: usize = 1000;

/// How many idle bytes to clock out at power up (at least 74 clocks)
pub const POWER_UP_IDLE_BYTES: usize = 10;

/// Build the six bytes of a command frame.
pub fn command_frame(command: u8, arg: u32) -> [u8; 6] {
    let crc = match command {
        CMD0 => CRC_CMD0,
        CMD8 => CRC_CMD8,
        _ => CRC_PLACEHOLDER,
    };
    let arg = arg.to_be_bytes();
    [CMD_START | command, arg[0], arg[1], arg[2], arg[3], crc]
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
