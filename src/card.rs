use crate::command::CommandApdu;
use crate::config::TransmitConfig;
use crate::errors::{Error, Result};
use crate::iso7816::GetResponse;
use crate::iso_case::IsoCase;
use crate::protocol::Protocol;
use crate::response::Response;
use crate::response_apdu::ResponseApdu;
use crate::transport::{Pci, Transport};
use tracing::{debug, trace, trace_span, warn};

/// SW1: response bytes still available, SW2 says how many.
const SW1_BYTES_REMAINING: u8 = 0x61;
/// SW1: wrong Le, SW2 says which one the card wanted.
const SW1_WRONG_LE: u8 = 0x6C;
/// SW1 SW2: part of the returned data may be corrupted. Chained like 0x61.
const SW_DATA_CORRUPTED: (u8, u8) = (0x62, 0x81);

/// A card behind a transport, which turns one command APDU into one complete response.
///
/// One logical transmit can take several physical exchanges: the receive buffer is grown if
/// the transport asks for it, a wrong Le (0x6CXX) is corrected once, and remaining response
/// bytes (0x61XX) are fetched with GET RESPONSE until the card is done. Status words other
/// than those are handed back as they are.
pub struct Card<T: Transport> {
    transport: T,
    config: TransmitConfig,
}

impl<T: Transport> Card<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, TransmitConfig::default())
    }

    pub fn with_config(transport: T, config: TransmitConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &TransmitConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }

    /// Starts a command for this card's protocol.
    pub fn command(&self, case: IsoCase, cla: u8, ins: u8, p1: u8, p2: u8) -> CommandApdu {
        CommandApdu::new(case, self.protocol(), cla, ins, p1, p2)
    }

    /// Executes a command against the card, and returns the whole response.
    pub fn transmit(&mut self, command: &CommandApdu) -> Result<Response> {
        let span = trace_span!("transmit", %command);
        let _enter = span.enter();

        let mut response = Response::new();
        let (mut rsp, mut pci) = self.exchange(command, command.expected_response_length())?;

        if rsp.sw1()? == SW1_WRONG_LE {
            let le = match rsp.sw2()? {
                0 => 256,
                n => n as usize,
            };
            if command.accepts_le() {
                debug!(le, "== RETR: Retrying with corrected Le");
                let retry = command.clone().with_expected_response_length(le + 2)?;
                self.wait();
                (rsp, pci) = self.exchange(&retry, le + 2)?;
            } else {
                warn!(le, "Card asked for a different Le, but the command has no Le field");
            }
        }

        // The first GET RESPONSE is bounded by the caller's Le, even after a 0x6C correction.
        // A zero Le doesn't limit anything.
        let mut outstanding = command.le();
        let mut chained = 0;
        while is_continuation(&rsp)? {
            if let Some(limit) = self.config.max_chain_len.filter(|&limit| chained >= limit) {
                warn!(limit, "Card is still sending data, giving up");
                return Err(Error::ChainTooLong { limit });
            }
            chained += 1;
            let remaining = match rsp.sw2()? {
                0 => 256,
                n => n as usize,
            };
            response.push(rsp, pci);

            let mut le = match outstanding {
                0 => remaining,
                n => remaining.min(n),
            };
            if let Some(max) = self.max_recv_size().filter(|&max| max > 2) {
                le = le.min(max - 2);
            }
            debug!(le, "== RESP: GET RESPONSE");
            let get_response = GetResponse::new(le).command(command.protocol())?;
            self.wait();
            (rsp, pci) = self.exchange(&get_response, le + 2)?;
            outstanding = rsp.sw2()? as usize;
        }

        response.push(rsp, pci);
        Ok(response)
    }

    /// One physical exchange, growing the receive buffer for as long as the transport says
    /// it needs a bigger one.
    fn exchange(&mut self, command: &CommandApdu, recv_len: usize) -> Result<(ResponseApdu, Pci)> {
        let span = trace_span!("exchange", recv_len);
        let _enter = span.enter();

        let req = command.to_vec().map_err(|err| match err {
            Error::InvalidOperation(fault) => Error::invalid_apdu(fault, command),
            err => err,
        })?;
        let send_pci = Pci::new(command.protocol());
        let mut recv_pci = send_pci;
        let mut recv = vec![0; recv_len];

        loop {
            trace!(req = %hex::encode_upper(&req), ">> TX");
            match self
                .transport
                .transmit(&send_pci, &req, &mut recv_pci, &mut recv)
            {
                Ok(len) => {
                    let rsp = ResponseApdu::new(recv, len);
                    trace!(rsp = %hex::encode_upper(rsp.as_bytes()), "<< RX");
                    return Ok((rsp, recv_pci));
                }
                Err(err) => match err.grow_to(recv.len()) {
                    Some(needed) => {
                        debug!(allocated = recv.len(), needed, "== GROW: Receive buffer too small");
                        recv.resize(needed, 0);
                        self.wait();
                    }
                    None => {
                        debug!(error = %err.error, "Transmit failed");
                        return Err(err.error.into());
                    }
                },
            }
        }
    }

    fn max_recv_size(&self) -> Option<usize> {
        self.config
            .max_recv_size
            .or_else(|| self.transport.max_recv_size())
    }

    fn wait(&self) {
        if let Some(wait) = self.config.retransmit_wait {
            trace!(?wait, "Waiting before retransmit");
            std::thread::sleep(wait);
        }
    }
}

fn is_continuation(rsp: &ResponseApdu) -> Result<bool> {
    let sw = (rsp.sw1()?, rsp.sw2()?);
    Ok(sw.0 == SW1_BYTES_REMAINING || sw == SW_DATA_CORRUPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApduFault;
    use crate::transport::mock::MockTransport;
    use std::time::{Duration, Instant};

    fn card(protocol: Protocol) -> Card<MockTransport> {
        Card::new(MockTransport::new(protocol))
    }

    fn read_binary(card: &Card<MockTransport>, le: usize) -> Result<CommandApdu> {
        card.command(IsoCase::Case2Short, 0x00, 0xB0, 0x00, 0x00)
            .with_le(le)
    }

    fn sent(card: &Card<MockTransport>) -> Vec<String> {
        card.transport().sent.iter().map(hex::encode_upper).collect()
    }

    #[test]
    fn single_exchange() -> Result<()> {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_sw(&[0x01, 0x02], 0x90, 0x00);

        let cmd = card
            .command(IsoCase::Case4Short, 0x00, 0xA4, 0x04, 0x00)
            .with_data(vec![0x3F, 0x00])?;
        let res = card.transmit(&cmd)?;
        assert_eq!(res.len(), 1);
        assert_eq!(res.status_word()?, 0x9000);
        assert_eq!(res.data(), Some(vec![0x01, 0x02]));
        assert_eq!(res.pci(0), Some(&Pci::new(Protocol::T1)));
        assert_eq!(sent(&card), vec!["00A40400023F0000"]);
        assert_eq!(card.transport().recv_sizes, vec![258]);
        Ok(())
    }

    #[test]
    fn get_response_chain() -> Result<()> {
        let mut card = card(Protocol::T0);
        card.transport_mut().push_sw(&[], 0x61, 10);
        card.transport_mut().push_sw(&[0x42; 10], 0x90, 0x00);

        let res = card.transmit(&read_binary(&card, 0)?)?;
        assert_eq!(res.len(), 2);
        assert_eq!(res.data().map(|d| d.len()), Some(10));
        assert_eq!(res.status_word()?, 0x9000);
        assert_eq!(res[0].status_word()?, 0x610A);
        assert_eq!(sent(&card), vec!["00B0000000", "00C000000A"]);
        assert_eq!(card.transport().recv_sizes, vec![258, 12]);
        Ok(())
    }

    #[test]
    fn get_response_chain_concatenates() -> Result<()> {
        let mut card = card(Protocol::T0);
        card.transport_mut().push_sw(&[0x01, 0x02], 0x61, 0x00);
        card.transport_mut().push_sw(&[0x03], 0x61, 0x02);
        card.transport_mut().push_sw(&[0x04, 0x05], 0x6A, 0x82);

        let res = card.transmit(&read_binary(&card, 0)?)?;
        assert_eq!(res.len(), 3);
        assert_eq!(res.data(), Some(vec![0x01, 0x02, 0x03, 0x04, 0x05]));
        assert_eq!(res.status_word()?, 0x6A82);
        assert_eq!(sent(&card), vec!["00B0000000", "00C0000000", "00C0000002"]);
        Ok(())
    }

    #[test]
    fn get_response_bounded_by_le() -> Result<()> {
        let mut card = card(Protocol::T0);
        card.transport_mut().push_sw(&[], 0x61, 0x10);
        card.transport_mut().push_sw(&[0xAA; 5], 0x61, 0x08);
        card.transport_mut().push_sw(&[0xBB; 8], 0x90, 0x00);

        let res = card.transmit(&read_binary(&card, 5)?)?;
        assert_eq!(res.len(), 3);
        assert_eq!(res.data().map(|d| d.len()), Some(13));
        assert_eq!(sent(&card), vec!["00B0000005", "00C0000005", "00C0000008"]);
        Ok(())
    }

    #[test]
    fn get_response_capped_by_reader() -> Result<()> {
        let mut card = Card::new(MockTransport::new(Protocol::T0).with_max_recv_size(34));
        card.transport_mut().push_sw(&[], 0x61, 0x00);
        card.transport_mut().push_sw(&[0x00; 32], 0x90, 0x00);

        card.transmit(&read_binary(&card, 0)?)?;
        assert_eq!(sent(&card)[1], "00C0000020");

        let mut card = Card::with_config(
            MockTransport::new(Protocol::T0).with_max_recv_size(34),
            TransmitConfig::default().with_max_recv_size(18),
        );
        card.transport_mut().push_sw(&[], 0x61, 0x00);
        card.transport_mut().push_sw(&[0x00; 16], 0x90, 0x00);
        card.transmit(&read_binary(&card, 0)?)?;
        assert_eq!(sent(&card)[1], "00C0000010");
        Ok(())
    }

    #[test]
    fn data_corrupted_warning_continues_chain() -> Result<()> {
        let mut card = card(Protocol::T0);
        card.transport_mut().push_sw(&[0x01], 0x62, 0x81);
        card.transport_mut().push_sw(&[0x02], 0x90, 0x00);

        let res = card.transmit(&read_binary(&card, 0)?)?;
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].status_word()?, 0x6281);
        assert_eq!(res.data(), Some(vec![0x01, 0x02]));
        assert_eq!(sent(&card), vec!["00B0000000", "00C0000081"]);
        Ok(())
    }

    #[test]
    fn other_warnings_end_the_chain() -> Result<()> {
        let mut card = card(Protocol::T0);
        card.transport_mut().push_sw(&[0x01], 0x62, 0x82);

        let res = card.transmit(&read_binary(&card, 0)?)?;
        assert_eq!(res.len(), 1);
        assert_eq!(res.status_word()?, 0x6282);
        assert_eq!(card.transport().sent.len(), 1);
        Ok(())
    }

    #[test]
    fn wrong_le_is_corrected_once() -> Result<()> {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_sw(&[], 0x6C, 5);
        card.transport_mut().push_sw(&[0x11; 5], 0x90, 0x00);

        let cmd = read_binary(&card, 0x10)?;
        let res = card.transmit(&cmd)?;
        assert_eq!(res.len(), 1);
        assert_eq!(res.status_word()?, 0x9000);
        assert_eq!(res.data(), Some(vec![0x11; 5]));
        assert_eq!(sent(&card), vec!["00B0000010", "00B0000005"]);
        assert_eq!(card.transport().recv_sizes, vec![18, 7]);
        // The caller's command is untouched.
        assert_eq!(cmd.le(), 0x10);
        Ok(())
    }

    #[test]
    fn wrong_le_not_repeated() -> Result<()> {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_sw(&[], 0x6C, 5);
        card.transport_mut().push_sw(&[], 0x6C, 4);

        let res = card.transmit(&read_binary(&card, 0x10)?)?;
        assert_eq!(res.len(), 1);
        assert_eq!(res.status_word()?, 0x6C04);
        assert_eq!(card.transport().sent.len(), 2);
        Ok(())
    }

    #[test]
    fn wrong_le_zero_means_256() -> Result<()> {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_sw(&[], 0x6C, 0x00);
        card.transport_mut().push_sw(&[0x00; 256], 0x90, 0x00);

        let res = card.transmit(&read_binary(&card, 0x10)?)?;
        assert_eq!(res.data().map(|d| d.len()), Some(256));
        assert_eq!(sent(&card)[1], "00B0000000");
        assert_eq!(card.transport().recv_sizes, vec![18, 258]);
        Ok(())
    }

    #[test]
    fn wrong_le_extended_case() -> Result<()> {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_sw(&[], 0x6C, 0x00);
        card.transport_mut().push_sw(&[0x00; 256], 0x90, 0x00);

        let cmd = card
            .command(IsoCase::Case2Extended, 0x00, 0xB0, 0x00, 0x00)
            .with_le(0x1000)?;
        card.transmit(&cmd)?;
        assert_eq!(sent(&card), vec!["00B00000001000", "00B00000000100"]);
        Ok(())
    }

    #[test]
    fn wrong_le_then_chain() -> Result<()> {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_sw(&[], 0x6C, 0x04);
        card.transport_mut().push_sw(&[0x01, 0x02, 0x03, 0x04], 0x61, 0x02);
        card.transport_mut().push_sw(&[0x05, 0x06], 0x90, 0x00);

        let res = card.transmit(&read_binary(&card, 0x10)?)?;
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].status_word()?, 0x6102);
        assert_eq!(res.data(), Some(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06]));
        assert_eq!(
            sent(&card),
            vec!["00B0000010", "00B0000004", "00C0000002"]
        );
        Ok(())
    }

    #[test]
    fn chain_after_wrong_le_keeps_callers_le() -> Result<()> {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_sw(&[], 0x6C, 0x04);
        card.transport_mut().push_sw(&[0x01; 4], 0x61, 0x08);
        card.transport_mut().push_sw(&[0x02; 8], 0x90, 0x00);

        let res = card.transmit(&read_binary(&card, 0x10)?)?;
        assert_eq!(res.data().map(|d| d.len()), Some(12));
        assert_eq!(
            sent(&card),
            vec!["00B0000010", "00B0000004", "00C0000008"]
        );
        Ok(())
    }

    #[test]
    fn endless_chain_is_cut_off() -> Result<()> {
        let mut card = Card::with_config(
            MockTransport::new(Protocol::T0),
            TransmitConfig::default().with_max_chain_len(Some(3)),
        );
        for _ in 0..10 {
            card.transport_mut().push_sw(&[0x00], 0x61, 0x01);
        }

        let cmd = read_binary(&card, 0)?;
        match card.transmit(&cmd) {
            Err(Error::ChainTooLong { limit: 3 }) => {}
            v => panic!("expected ChainTooLong, got {:?}", v.map(|r| r.len())),
        }
        assert_eq!(card.transport().sent.len(), 4);
        assert_eq!(sent(&card)[1..], ["00C0000001"; 3]);
        Ok(())
    }

    #[test]
    fn chain_cap_allows_exact_length() -> Result<()> {
        let mut card = Card::with_config(
            MockTransport::new(Protocol::T0),
            TransmitConfig::default().with_max_chain_len(Some(2)),
        );
        card.transport_mut().push_sw(&[0x01], 0x61, 0x01);
        card.transport_mut().push_sw(&[0x02], 0x61, 0x01);
        card.transport_mut().push_sw(&[0x03], 0x90, 0x00);

        let res = card.transmit(&read_binary(&card, 0)?)?;
        assert_eq!(res.len(), 3);
        assert_eq!(res.data(), Some(vec![0x01, 0x02, 0x03]));
        Ok(())
    }

    #[test]
    fn wrong_le_without_le_field() -> Result<()> {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_sw(&[], 0x6C, 0x05);

        let cmd = card
            .command(IsoCase::Case3Short, 0x00, 0xD6, 0x00, 0x00)
            .with_data(vec![0x01])?;
        let res = card.transmit(&cmd)?;
        assert_eq!(res.status_word()?, 0x6C05);
        assert_eq!(card.transport().sent.len(), 1);
        Ok(())
    }

    #[test]
    fn buffer_grows_once() -> Result<()> {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_sw(&[0x77; 8], 0x90, 0x00);

        let res = card.transmit(&read_binary(&card, 4)?)?;
        assert_eq!(res.len(), 1);
        assert_eq!(res.data(), Some(vec![0x77; 8]));
        assert_eq!(card.transport().recv_sizes, vec![6, 10]);
        assert_eq!(sent(&card), vec!["00B0000004", "00B0000004"]);
        Ok(())
    }

    #[test]
    fn insufficient_buffer_without_size_fails() {
        let mut card = card(Protocol::T1);
        card.transport_mut()
            .push_failure(pcsc::Error::InsufficientBuffer);

        let cmd = read_binary(&card, 4).unwrap();
        match card.transmit(&cmd).unwrap_err() {
            Error::Transport(pcsc::Error::InsufficientBuffer) => {}
            v => panic!("wrong error: {}", v),
        }
        assert_eq!(card.transport().sent.len(), 1);
    }

    #[test]
    fn transport_errors_propagate() {
        let mut card = card(Protocol::T0);
        card.transport_mut().push_sw(&[], 0x61, 0x10);
        card.transport_mut().push_failure(pcsc::Error::RemovedCard);

        let cmd = read_binary(&card, 0).unwrap();
        match card.transmit(&cmd).unwrap_err() {
            Error::Transport(pcsc::Error::RemovedCard) => {}
            v => panic!("wrong error: {}", v),
        }
    }

    #[test]
    fn invalid_command_is_not_sent() {
        let mut card = card(Protocol::T1);
        let cmd = card.command(IsoCase::Case3Short, 0x00, 0xD6, 0x00, 0x00);

        match card.transmit(&cmd).unwrap_err() {
            Error::InvalidApdu {
                fault: ApduFault::DataRequired(IsoCase::Case3Short),
                apdu,
            } => assert_eq!(*apdu, cmd),
            v => panic!("wrong error: {}", v),
        }
        assert!(card.transport().sent.is_empty());
    }

    #[test]
    fn truncated_response() {
        let mut card = card(Protocol::T1);
        card.transport_mut().push_response(vec![0x90]);

        let cmd = read_binary(&card, 0).unwrap();
        match card.transmit(&cmd).unwrap_err() {
            Error::InvalidResponse { len: 1 } => {}
            v => panic!("wrong error: {}", v),
        }
    }

    #[test]
    fn t0_case4_goes_through_get_response() -> Result<()> {
        let mut card = card(Protocol::T0);
        card.transport_mut().push_sw(&[], 0x61, 0x03);
        card.transport_mut().push_sw(&[0x6F, 0x01, 0x00], 0x90, 0x00);

        let cmd = card
            .command(IsoCase::Case4Extended, 0x00, 0xA4, 0x04, 0x00)
            .with_data(vec![0xA0, 0x00])?;
        let res = card.transmit(&cmd)?;
        assert_eq!(res.data(), Some(vec![0x6F, 0x01, 0x00]));
        assert_eq!(sent(&card), vec!["00A4040002A000", "00C0000003"]);
        Ok(())
    }

    #[test]
    fn waits_between_exchanges() -> Result<()> {
        let mut card = Card::with_config(
            MockTransport::new(Protocol::T0),
            TransmitConfig::default().with_retransmit_wait(Duration::from_millis(5)),
        );
        card.transport_mut().push_sw(&[], 0x61, 0x01);
        card.transport_mut().push_sw(&[0x01], 0x61, 0x01);
        card.transport_mut().push_sw(&[0x02], 0x90, 0x00);

        let start = Instant::now();
        card.transmit(&read_binary(&card, 0)?)?;
        assert!(start.elapsed() >= Duration::from_millis(10));
        Ok(())
    }

    #[test]
    fn works_through_a_reference() -> Result<()> {
        let mut mock = MockTransport::new(Protocol::T1);
        mock.push_sw(&[], 0x90, 0x00);
        {
            let mut card = Card::new(&mut mock);
            let cmd = card.command(IsoCase::Case1, 0x00, 0x44, 0x00, 0x00);
            card.transmit(&cmd)?;
        }
        assert_eq!(mock.sent, vec![vec![0x00, 0x44, 0x00, 0x00]]);
        Ok(())
    }
}
