//! Sensores térmicos via `IOHIDEventSystemClient`.
//!
//! Chips sem chaves térmicas no SMC (M1) expõem as temperaturas como
//! serviços HID da página vendor da Apple.

use super::ffi::{self, CfRef};
use crate::thermal::{NamedReading, ThermalFallback};
use std::ffi::c_void;
use tracing::debug;

const HID_PAGE_APPLE_VENDOR: i32 = 0xff00;
const HID_USAGE_TEMPERATURE_SENSOR: i32 = 5;
const HID_EVENT_TYPE_TEMPERATURE: i64 = 15;
/// Campo do valor: `tipo << 16`.
const TEMPERATURE_FIELD: i32 = (HID_EVENT_TYPE_TEMPERATURE as i32) << 16;

/// Fallback HID. Cria um cliente novo a cada leitura.
#[derive(Debug, Default)]
pub struct HidThermal;

impl HidThermal {
    fn matching_dict() -> Option<CfRef> {
        let page = cf_i32(HID_PAGE_APPLE_VENDOR)?;
        let usage = cf_i32(HID_USAGE_TEMPERATURE_SENSOR)?;
        let k_page = ffi::cf_string("PrimaryUsagePage")?;
        let k_usage = ffi::cf_string("PrimaryUsage")?;

        let keys = [k_page.as_ptr(), k_usage.as_ptr()];
        let values = [page.as_ptr(), usage.as_ptr()];
        // SAFETY: arrays de mesmo tamanho; callbacks padrão retêm chaves e valores.
        let dict = unsafe {
            ffi::CFDictionaryCreate(
                std::ptr::null(),
                keys.as_ptr(),
                values.as_ptr(),
                keys.len() as ffi::CFIndex,
                &raw const ffi::kCFTypeDictionaryKeyCallBacks,
                &raw const ffi::kCFTypeDictionaryValueCallBacks,
            )
        };
        CfRef::owned(dict)
    }
}

impl ThermalFallback for HidThermal {
    fn read_sensors(&self) -> Vec<NamedReading> {
        let mut readings = Vec::new();

        // SAFETY: alocador padrão.
        let client = unsafe { ffi::IOHIDEventSystemClientCreate(std::ptr::null()) };
        let Some(client) = CfRef::owned(client) else {
            debug!("IOHIDEventSystemClientCreate retornou nulo");
            return readings;
        };
        let Some(matching) = Self::matching_dict() else {
            return readings;
        };
        // SAFETY: cliente e dicionário válidos.
        unsafe { ffi::IOHIDEventSystemClientSetMatching(client.as_mut_ptr(), matching.as_ptr()) };

        // SAFETY: cliente válido; o array retornado tem posse (Copy).
        let services = unsafe { ffi::IOHIDEventSystemClientCopyServices(client.as_mut_ptr()) };
        let Some(services) = CfRef::owned(services) else {
            return readings;
        };
        let Some(product_key) = ffi::cf_string("Product") else {
            return readings;
        };

        // SAFETY: `services` é um CFArray válido.
        let count = unsafe { ffi::CFArrayGetCount(services.as_ptr()) };
        for i in 0..count {
            // SAFETY: índice dentro de [0, count); valor sem posse.
            let service = unsafe { ffi::CFArrayGetValueAtIndex(services.as_ptr(), i) };
            if service.is_null() {
                continue;
            }
            if let Some(reading) = read_service(service, &product_key) {
                readings.push(reading);
            }
        }
        readings
    }
}

fn read_service(service: *const c_void, product_key: &CfRef) -> Option<NamedReading> {
    // SAFETY: serviço válido; propriedade retornada com posse.
    let product = CfRef::owned(unsafe {
        ffi::IOHIDServiceClientCopyProperty(service, product_key.as_ptr())
    })?;
    let name = ffi::string_from_cf(product.as_ptr())?;

    // SAFETY: serviço válido; evento retornado com posse.
    let event = CfRef::owned(unsafe {
        ffi::IOHIDServiceClientCopyEvent(service, HID_EVENT_TYPE_TEMPERATURE, 0, 0)
    })?;
    // SAFETY: evento de temperatura válido.
    let celsius = unsafe { ffi::IOHIDEventGetFloatValue(event.as_ptr(), TEMPERATURE_FIELD) } as f32;

    Some(NamedReading { name, celsius })
}

fn cf_i32(value: i32) -> Option<CfRef> {
    // SAFETY: `value` vive durante a chamada; CFNumber copia o valor.
    let ptr = unsafe {
        ffi::CFNumberCreate(
            std::ptr::null(),
            ffi::CF_NUMBER_SINT32_TYPE,
            (&value as *const i32).cast::<c_void>(),
        )
    };
    CfRef::owned(ptr)
}
