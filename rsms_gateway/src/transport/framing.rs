// transport/framing.rs: relay datagram layout
//
// [u16 BE topic len][topic utf-8][u32 BE payload len][payload]

use crate::errors::GatewayError;

#[derive(Default, Clone, Copy, Debug)]
pub struct Framer;

impl Framer {
    pub fn frame(&self, topic: &str, payload: &[u8]) -> Result<Vec<u8>, GatewayError> {
        let topic_len = u16::try_from(topic.len())
            .map_err(|_| GatewayError::Transport(format!("topic of {} bytes", topic.len())))?;
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| GatewayError::Transport(format!("payload of {} bytes", payload.len())))?;
        let mut framed = Vec::with_capacity(2 + topic.len() + 4 + payload.len());
        framed.extend_from_slice(&topic_len.to_be_bytes());
        framed.extend_from_slice(topic.as_bytes());
        framed.extend_from_slice(&payload_len.to_be_bytes());
        framed.extend_from_slice(payload);
        Ok(framed)
    }

    pub fn deframe<'a>(&self, buf: &'a [u8]) -> Result<(&'a str, &'a [u8]), GatewayError> {
        if buf.len() < 2 {
            return Err(GatewayError::Decode("short".into()));
        }
        let topic_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        let rest = &buf[2..];
        if rest.len() < topic_len + 4 {
            return Err(GatewayError::Decode("incomplete topic".into()));
        }
        let topic = std::str::from_utf8(&rest[..topic_len])
            .map_err(|e| GatewayError::Decode(format!("topic: {e}")))?;
        let rest = &rest[topic_len..];
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let rest = &rest[4..];
        if rest.len() < len {
            return Err(GatewayError::Decode("incomplete payload".into()));
        }
        Ok((topic, &rest[..len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_then_deframe() {
        let f = Framer;
        let framed = f.frame("TSP/RSMS", &[1, 2, 3]).unwrap();
        assert_eq!(&framed[..2], &[0, 8]);
        let (topic, payload) = f.deframe(&framed).unwrap();
        assert_eq!(topic, "TSP/RSMS");
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn rejects_short_buffers() {
        let f = Framer;
        let framed = f.frame("A", &[9; 10]).unwrap();
        assert!(f.deframe(&framed[..1]).is_err());
        assert!(f.deframe(&framed[..4]).is_err());
        assert!(f.deframe(&framed[..framed.len() - 1]).is_err());
    }
}
