use hex_literal::hex;

use super::busy::SdMmcSpiBusy;
use super::proto::*;
use super::{AcquireOpts, CardType, Error, SdMmcSpi};
use crate::test::{init_logger, SimCard};
use crate::BlockIdx;

fn acquired(card: &mut SimCard) -> SdMmcSpi<&mut SimCard> {
    init_logger();
    let mut sdmmc = SdMmcSpi::new(card, AcquireOpts::default());
    sdmmc.acquire().unwrap();
    sdmmc
}

#[test]
fn command_frames() {
    assert_eq!(command_frame(CMD0, 0), hex!("40 00 00 00 00 95"));
    assert_eq!(command_frame(CMD8, CMD8_VOLTAGE_CHECK), hex!("48 00 00 01 AA 87"));
    assert_eq!(command_frame(CMD17, 0x0102_0304), hex!("51 01 02 03 04 01"));
    assert_eq!(command_frame(ACMD41, ACMD41_HCS), hex!("69 40 00 00 00 01"));
}

#[test]
fn handshake_sends_the_expected_commands() {
    let mut card = SimCard::new();
    card.idle_polls = 1;
    let sdmmc = acquired(&mut card);
    assert_eq!(sdmmc.card_type(), CardType::SD2 | CardType::BLOCK);
    drop(sdmmc);

    let expected = [
        hex!("40 00 00 00 00 95"),
        hex!("48 00 00 01 AA 87"),
        hex!("77 00 00 00 00 01"),
        hex!("69 40 00 00 00 01"),
        hex!("77 00 00 00 00 01"),
        hex!("69 40 00 00 00 01"),
        hex!("7A 00 00 00 00 01"),
    ];
    assert_eq!(card.frames, expected.to_vec());
    assert!(!card.selected);
}

#[test]
fn every_command_gets_a_fresh_chip_select() {
    let mut card = SimCard::new();
    let mut sdmmc = acquired(&mut card);
    let releases = sdmmc.link().releases;
    assert_eq!(sdmmc.command(CMD58, 0), Ok(R1_READY_STATE));
    // One release before the command, one when the guard drops.
    assert_eq!(sdmmc.link().releases, releases + 2);
}

#[test]
fn stop_transmission_skips_the_stuff_byte() {
    let mut card = SimCard::new();
    let mut sdmmc = acquired(&mut card);
    assert_eq!(sdmmc.command(CMD12, 0), Ok(R1_READY_STATE));
}

#[test]
fn refused_app_prefix_is_returned_without_the_command() {
    let mut card = SimCard::new();
    let mut sdmmc = acquired(&mut card);
    sdmmc.link().app_prefix_response = Some(0x05);
    let before = sdmmc.link().frames_for(ACMD41).len();

    let mut busy = SdMmcSpiBusy::new(sdmmc.link()).unwrap();
    assert_eq!(busy.card_acmd(ACMD41, ACMD41_HCS, 500), Ok(0x05));
    drop(busy);

    assert_eq!(sdmmc.link().frames_for(ACMD41).len(), before);
}

#[test]
fn refused_app_prefix_during_start_up_times_out() {
    init_logger();
    let mut card = SimCard::new();
    card.app_prefix_response = Some(0x05);
    let mut sdmmc = SdMmcSpi::new(&mut card, AcquireOpts::default());
    assert_eq!(sdmmc.acquire(), Err(Error::TimeoutACommand(ACMD41)));
    assert_eq!(sdmmc.card_type(), CardType::empty());
}

#[test]
fn commands_wait_for_a_busy_card() {
    let mut card = SimCard::new();
    let mut sdmmc = acquired(&mut card);
    sdmmc.link().busy_forever = true;
    let mut block = [0u8; 512];
    sdmmc.write_block(&block, BlockIdx(1)).unwrap_err();

    let start = sdmmc.link().ticks;
    assert_eq!(
        sdmmc.read_block(&mut block, BlockIdx(1)),
        Err(Error::TimeoutWaitNotBusy)
    );
    let elapsed = sdmmc.link().ticks - start;
    assert!(elapsed >= 500 && elapsed < 520, "took {} ms", elapsed);
}

#[test]
fn unbounded_write_busy_wait_still_finishes() {
    let mut card = SimCard::new();
    card.busy_bytes = 2000;
    init_logger();
    let options = AcquireOpts {
        write_busy_timeout_ms: None,
        ..AcquireOpts::default()
    };
    let mut sdmmc = SdMmcSpi::new(&mut card, options);
    sdmmc.acquire().unwrap();
    sdmmc.write_block(&[0x5A; 512], BlockIdx(9)).unwrap();
    drop(sdmmc);
    assert_eq!(card.sector(9).contents[..], [0x5A; 512][..]);
}

#[test]
fn bounded_write_busy_wait_gives_up() {
    let mut card = SimCard::new();
    card.busy_bytes = 2000;
    let mut sdmmc = acquired(&mut card);
    assert_eq!(
        sdmmc.write_block(&[0x5A; 512], BlockIdx(9)),
        Err(Error::TimeoutWriteBusy)
    );
}

#[test]
fn byte_addressed_cards_get_byte_addresses() {
    let mut card = SimCard::new();
    card.ocr_ccs = false;
    let mut sdmmc = acquired(&mut card);
    assert_eq!(sdmmc.card_type(), CardType::SD2);

    let payload = [0xC3; 512];
    sdmmc.write_block(&payload, BlockIdx(5)).unwrap();
    let mut read_back = [0u8; 512];
    sdmmc.read_block(&mut read_back, BlockIdx(5)).unwrap();
    assert_eq!(read_back[..], payload[..]);
    drop(sdmmc);

    assert_eq!(card.frames_for(CMD17), vec![hex!("51 00 00 0A 00 01")]);
    assert_eq!(card.frames_for(CMD24), vec![hex!("58 00 00 0A 00 01")]);
}

#[test]
fn byte_addresses_stop_at_four_gigabytes() {
    let mut card = SimCard::new();
    card.ocr_ccs = false;
    let mut sdmmc = acquired(&mut card);

    // The last byte addressable block goes out, and this small card refuses it.
    assert_eq!(
        sdmmc.write_block(&[0x11; 512], BlockIdx(8_388_607)),
        Err(Error::WriteError)
    );
    assert_eq!(
        sdmmc.write_block(&[0x22; 512], BlockIdx(8_388_608)),
        Err(Error::BadAddress)
    );
    let mut block = [0u8; 512];
    assert_eq!(
        sdmmc.read_block(&mut block, BlockIdx(u32::MAX)),
        Err(Error::BadAddress)
    );
    drop(sdmmc);

    assert_eq!(card.frames_for(CMD24), vec![hex!("58 FF FF FE 00 01")]);
    assert!(card.frames_for(CMD17).is_empty());
}

#[test]
fn block_addressed_cards_reach_the_last_sector_number() {
    let mut card = SimCard::new();
    let mut sdmmc = acquired(&mut card);
    let mut block = [0u8; 512];
    assert_eq!(
        sdmmc.read_block(&mut block, BlockIdx(u32::MAX)),
        Err(Error::ReadError)
    );
    drop(sdmmc);
    assert_eq!(card.frames_for(CMD17), vec![hex!("51 FF FF FF FF 01")]);
}

#[test]
fn cards_without_ocr_are_block_addressed() {
    let mut card = SimCard::new();
    card.answer_ocr = false;
    let mut sdmmc = acquired(&mut card);
    assert_eq!(sdmmc.card_type(), CardType::SD2 | CardType::BLOCK);
    sdmmc.write_block(&[1; 512], BlockIdx(3)).unwrap();
    drop(sdmmc);
    assert_eq!(card.frames_for(CMD24), vec![hex!("58 00 00 00 03 01")]);
}

#[test]
fn bad_interface_check_pattern_is_unsupported() {
    init_logger();
    let mut card = SimCard::new();
    card.cmd8_pattern = Some(0x55);
    let mut sdmmc = SdMmcSpi::new(&mut card, AcquireOpts::default());
    assert_eq!(sdmmc.acquire(), Err(Error::UnsupportedCard));
    drop(sdmmc);
    assert!(card.frames_for(ACMD41).is_empty());
}

#[test]
fn idle_card_without_interface_payload_is_unsupported() {
    init_logger();
    let mut card = SimCard::new();
    card.cmd8_pattern = Some(0xFF);
    let mut sdmmc = SdMmcSpi::new(&mut card, AcquireOpts::default());
    assert_eq!(sdmmc.acquire(), Err(Error::UnsupportedCard));
    assert_eq!(sdmmc.card_type(), CardType::empty());
}

#[test]
fn interface_check_echoes_the_pattern() {
    let mut card = SimCard::new();
    let mut sdmmc = acquired(&mut card);

    let mut busy = SdMmcSpiBusy::new(sdmmc.link()).unwrap();
    assert_eq!(busy.card_command(CMD8, 0x155, 500), Ok(R1_READY_STATE));
    busy.receive().unwrap();
    busy.receive().unwrap();
    assert_eq!(busy.receive(), Ok(0x01));
    assert_eq!(busy.receive(), Ok(0x55));
}
