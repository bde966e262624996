//! Conexão com o SMC (`AppleSMCKeysEndpoint`) via `IOConnectCallStructMethod`.

use super::ffi::{self, IoObjectT, KERN_SUCCESS};
use crate::decode::{DataType, KeyInfo, RawSample, SensorKey, MAX_KEY_BYTES};
use crate::registry::{ProviderError, SensorProvider};
use std::ffi::c_void;

/// Seletor do método de struct do driver.
const KERNEL_INDEX_SMC: u32 = 2;
const CMD_READ_BYTES: u8 = 5;
const CMD_READ_KEYINFO: u8 = 9;
/// Código de resultado "chave inexistente".
const RESULT_KEY_NOT_FOUND: u8 = 132;

#[repr(C)]
#[derive(Default, Clone, Copy)]
struct SmcVersion {
    major: u8,
    minor: u8,
    build: u8,
    reserved: u8,
    release: u16,
}

#[repr(C)]
#[derive(Default, Clone, Copy)]
struct SmcPLimitData {
    version: u16,
    length: u16,
    cpu_p_limit: u32,
    gpu_p_limit: u32,
    mem_p_limit: u32,
}

#[repr(C)]
#[derive(Default, Clone, Copy)]
struct SmcKeyInfoData {
    data_size: u32,
    data_type: u32,
    data_attributes: u8,
}

/// Estrutura de entrada/saída do driver (80 bytes, layout C).
#[repr(C)]
#[derive(Default, Clone, Copy)]
struct SmcKeyData {
    key: u32,
    vers: SmcVersion,
    p_limit_data: SmcPLimitData,
    key_info: SmcKeyInfoData,
    result: u8,
    status: u8,
    data8: u8,
    data32: u32,
    bytes: [u8; MAX_KEY_BYTES],
}

/// Conexão aberta com o SMC. Fechada no drop.
pub struct SmcConnection {
    conn: IoObjectT,
}

impl SmcConnection {
    /// Procura `AppleSMCKeysEndpoint` sob `AppleSMC` e abre a conexão.
    pub fn open() -> Result<Self, ProviderError> {
        let device = ffi::find_service(c"AppleSMC", "AppleSMCKeysEndpoint").ok_or_else(|| {
            ProviderError::Unavailable("AppleSMCKeysEndpoint não encontrado".into())
        })?;

        let mut conn: IoObjectT = 0;
        // SAFETY: `device` é um serviço válido; `conn` recebe o handle.
        let kr = unsafe { ffi::IOServiceOpen(device.0, ffi::task_self(), 0, &mut conn) };
        if kr != KERN_SUCCESS || conn == 0 {
            return Err(ProviderError::Unavailable(format!(
                "IOServiceOpen falhou (0x{kr:08x})"
            )));
        }
        Ok(Self { conn })
    }

    fn call(&self, key: SensorKey, input: &SmcKeyData) -> Result<SmcKeyData, ProviderError> {
        let mut output = SmcKeyData::default();
        let mut out_size = size_of::<SmcKeyData>();
        // SAFETY: buffers com o tamanho exato da struct esperada pelo driver.
        let kr = unsafe {
            ffi::IOConnectCallStructMethod(
                self.conn,
                KERNEL_INDEX_SMC,
                (input as *const SmcKeyData).cast::<c_void>(),
                size_of::<SmcKeyData>(),
                (&mut output as *mut SmcKeyData).cast::<c_void>(),
                &mut out_size,
            )
        };
        if kr != KERN_SUCCESS {
            return Err(ProviderError::Call { key, code: kr });
        }
        match output.result {
            0 => Ok(output),
            RESULT_KEY_NOT_FOUND => Err(ProviderError::KeyNotFound(key)),
            code => Err(ProviderError::Call {
                key,
                code: code as i32,
            }),
        }
    }
}

impl SensorProvider for SmcConnection {
    fn key_info(&self, key: SensorKey) -> Result<KeyInfo, ProviderError> {
        let input = SmcKeyData {
            key: key.fourcc(),
            data8: CMD_READ_KEYINFO,
            ..Default::default()
        };
        let out = self.call(key, &input)?;
        Ok(KeyInfo {
            data_size: out.key_info.data_size,
            data_type: DataType::from_fourcc(out.key_info.data_type),
            attributes: out.key_info.data_attributes,
        })
    }

    fn read_bytes(&self, key: SensorKey, info: &KeyInfo) -> Result<RawSample, ProviderError> {
        if info.data_size as usize > MAX_KEY_BYTES {
            return Err(ProviderError::Oversized {
                key,
                size: info.data_size,
            });
        }
        let input = SmcKeyData {
            key: key.fourcc(),
            data8: CMD_READ_BYTES,
            key_info: SmcKeyInfoData {
                data_size: info.data_size,
                data_type: info.data_type.fourcc(),
                data_attributes: info.attributes,
            },
            ..Default::default()
        };
        let out = self.call(key, &input)?;
        Ok(RawSample { bytes: out.bytes })
    }
}

impl Drop for SmcConnection {
    fn drop(&mut self) {
        // SAFETY: `conn` foi aberto por IOServiceOpen e é fechado uma única vez.
        unsafe { ffi::IOServiceClose(self.conn) };
    }
}
