/// CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF). Sent low byte first.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Appends the CRC of `frame` to itself in wire order.
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16_modbus(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Checks the trailing two CRC bytes of a complete frame.
pub fn verify_crc(frame: &[u8]) -> Result<(), (u16, u16)> {
    if frame.len() < 2 {
        return Err((0, 0));
    }
    let data_len = frame.len() - 2;
    let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    let calculated = crc16_modbus(&frame[..data_len]);
    if received == calculated {
        Ok(())
    } else {
        Err((calculated, received))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus() {
        // Read 1 holding register at 0x0000 from slave 1: 01 03 00 00 00 01 84 0A
        let data = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16_modbus(&data), 0x0A84);
    }

    #[test]
    fn test_check_value() {
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_append_and_verify() {
        let mut frame = vec![0x02, 0x06, 0x00, 0x01, 0x03, 0xE8];
        append_crc(&mut frame);
        assert_eq!(frame.len(), 8);
        assert!(verify_crc(&frame).is_ok());

        frame[4] ^= 0xFF;
        assert!(verify_crc(&frame).is_err());
    }
}
