//! IOReport carregado dinamicamente (`libIOReport.dylib`).
//!
//! A biblioteca é privada: se o carregamento ou algum símbolo obrigatório
//! falhar o provedor fica [`IoReport::Unavailable`] e o amostrador nunca
//! chega a ser ativado.

use super::ffi::{self, CFDictionaryRef, CFMutableDictionaryRef, CFStringRef, CFTypeRef, CfRef};
use crate::power::{ChannelReading, CounterTelemetry, ENERGY_GROUP, GPU_STATS_GROUP, StateResidency};
use libloading::Library;
use std::ffi::c_void;
use tracing::debug;

const IOREPORT_PATH: &str = "/usr/lib/libIOReport.dylib";

type CopyChannelsInGroupFn =
    unsafe extern "C" fn(CFStringRef, CFStringRef, u64, u64, u64) -> CFDictionaryRef;
type MergeChannelsFn = unsafe extern "C" fn(CFDictionaryRef, CFDictionaryRef, CFTypeRef);
type CreateSubscriptionFn = unsafe extern "C" fn(
    *const c_void,
    CFMutableDictionaryRef,
    *mut CFMutableDictionaryRef,
    u64,
    CFTypeRef,
) -> *const c_void;
type CreateSamplesFn =
    unsafe extern "C" fn(*const c_void, CFMutableDictionaryRef, CFTypeRef) -> CFDictionaryRef;
type CreateSamplesDeltaFn =
    unsafe extern "C" fn(CFDictionaryRef, CFDictionaryRef, CFTypeRef) -> CFDictionaryRef;
type ChannelStringFn = unsafe extern "C" fn(CFDictionaryRef) -> CFStringRef;
type SimpleGetIntegerValueFn = unsafe extern "C" fn(CFDictionaryRef, i32) -> i64;
type StateGetCountFn = unsafe extern "C" fn(CFDictionaryRef) -> i32;
type StateGetNameForIndexFn = unsafe extern "C" fn(CFDictionaryRef, i32) -> CFStringRef;
type StateGetResidencyFn = unsafe extern "C" fn(CFDictionaryRef, i32) -> i64;

/// Tabela de funções resolvidas. Os ponteiros valem enquanto `_lib` viver.
pub struct IoReportApi {
    _lib: Library,
    copy_channels_in_group: CopyChannelsInGroupFn,
    merge_channels: Option<MergeChannelsFn>,
    create_subscription: CreateSubscriptionFn,
    create_samples: CreateSamplesFn,
    create_samples_delta: Option<CreateSamplesDeltaFn>,
    channel_group: Option<ChannelStringFn>,
    channel_subgroup: Option<ChannelStringFn>,
    channel_name: Option<ChannelStringFn>,
    channel_unit: Option<ChannelStringFn>,
    simple_integer_value: SimpleGetIntegerValueFn,
    state_count: Option<StateGetCountFn>,
    state_name: Option<StateGetNameForIndexFn>,
    state_residency: Option<StateGetResidencyFn>,
}

fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Option<T> {
    // SAFETY: `T` é o tipo de ponteiro de função declarado para o símbolo.
    unsafe { lib.get::<T>(name).ok().map(|s| *s) }
}

impl IoReportApi {
    fn load() -> Result<Self, String> {
        // SAFETY: biblioteca do sistema sem inicializadores com efeitos colaterais.
        let lib = unsafe { Library::new(IOREPORT_PATH) }.map_err(|e| e.to_string())?;

        let required = |name: &str| format!("símbolo obrigatório ausente: {name}");
        Ok(Self {
            copy_channels_in_group: symbol(&lib, b"IOReportCopyChannelsInGroup\0")
                .ok_or_else(|| required("IOReportCopyChannelsInGroup"))?,
            create_subscription: symbol(&lib, b"IOReportCreateSubscription\0")
                .ok_or_else(|| required("IOReportCreateSubscription"))?,
            create_samples: symbol(&lib, b"IOReportCreateSamples\0")
                .ok_or_else(|| required("IOReportCreateSamples"))?,
            simple_integer_value: symbol(&lib, b"IOReportSimpleGetIntegerValue\0")
                .ok_or_else(|| required("IOReportSimpleGetIntegerValue"))?,
            merge_channels: symbol(&lib, b"IOReportMergeChannels\0"),
            create_samples_delta: symbol(&lib, b"IOReportCreateSamplesDelta\0"),
            channel_group: symbol(&lib, b"IOReportChannelGetGroup\0"),
            channel_subgroup: symbol(&lib, b"IOReportChannelGetSubGroup\0"),
            channel_name: symbol(&lib, b"IOReportChannelGetChannelName\0"),
            channel_unit: symbol(&lib, b"IOReportChannelGetUnitLabel\0"),
            state_count: symbol(&lib, b"IOReportStateGetCount\0"),
            state_name: symbol(&lib, b"IOReportStateGetNameForIndex\0"),
            state_residency: symbol(&lib, b"IOReportStateGetResidency\0"),
            _lib: lib,
        })
    }

    fn channel_string(&self, getter: Option<ChannelStringFn>, ch: CFDictionaryRef) -> String {
        getter
            // SAFETY: `ch` é um canal do array de delta; a string não tem posse.
            .and_then(|f| ffi::string_from_cf(unsafe { f(ch) }))
            .unwrap_or_default()
    }

    fn states(&self, ch: CFDictionaryRef) -> Vec<StateResidency> {
        let (Some(count), Some(residency)) = (self.state_count, self.state_residency) else {
            return Vec::new();
        };
        // SAFETY: canal de residência válido.
        let n = unsafe { count(ch) };
        (0..n)
            .map(|i| StateResidency {
                // SAFETY: índice dentro de [0, n).
                name: self
                    .state_name
                    .and_then(|f| ffi::string_from_cf(unsafe { f(ch, i) })),
                // SAFETY: índice dentro de [0, n).
                residency: unsafe { residency(ch, i) },
            })
            .collect()
    }

    fn reading(&self, ch: CFDictionaryRef) -> ChannelReading {
        let group = self.channel_string(self.channel_group, ch);
        let mut reading = ChannelReading {
            subgroup: self.channel_string(self.channel_subgroup, ch),
            name: self.channel_string(self.channel_name, ch),
            unit: self.channel_string(self.channel_unit, ch),
            ..Default::default()
        };
        if group == ENERGY_GROUP {
            // SAFETY: canal simples do grupo de energia.
            reading.value = unsafe { (self.simple_integer_value)(ch, 0) };
        } else if group == GPU_STATS_GROUP {
            reading.states = self.states(ch);
        }
        reading.group = group;
        reading
    }
}

/// Provedor IOReport: carregado ou indisponível.
pub enum IoReport {
    Available(IoReportApi),
    Unavailable(String),
}

impl IoReport {
    pub fn load() -> Self {
        match IoReportApi::load() {
            Ok(api) => {
                debug!("IOReport carregado de {IOREPORT_PATH}");
                Self::Available(api)
            }
            Err(e) => {
                debug!("IOReport indisponível: {e}");
                Self::Unavailable(e)
            }
        }
    }

    /// Motivo da indisponibilidade, se houver.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }

    fn api(&self) -> Option<&IoReportApi> {
        match self {
            Self::Available(api) => Some(api),
            Self::Unavailable(_) => None,
        }
    }
}

impl CounterTelemetry for IoReport {
    /// Dicionário mutável de canais.
    type Channels = CfRef;
    type Subscription = CfRef;
    type Sample = CfRef;

    fn channels_in_group(&self, group: &str, subgroup: Option<&str>) -> Option<CfRef> {
        let api = self.api()?;
        let group = ffi::cf_string(group)?;
        let subgroup = match subgroup {
            Some(s) => Some(ffi::cf_string(s)?),
            None => None,
        };
        let sub_ptr = subgroup.as_ref().map_or(std::ptr::null(), CfRef::as_ptr);

        // SAFETY: strings válidas; o dicionário retornado tem posse (Copy).
        let channels = CfRef::owned(unsafe {
            (api.copy_channels_in_group)(group.as_ptr(), sub_ptr, 0, 0, 0)
        })?;
        // SAFETY: dicionário válido; a cópia mutável tem posse.
        let mutable = unsafe {
            ffi::CFDictionaryCreateMutableCopy(
                std::ptr::null(),
                ffi::CFDictionaryGetCount(channels.as_ptr()),
                channels.as_ptr(),
            )
        };
        CfRef::owned(mutable)
    }

    fn merge(&self, base: CfRef, extra: CfRef) -> CfRef {
        if let Some(merge) = self.api().and_then(|api| api.merge_channels) {
            // SAFETY: ambos os dicionários são válidos; `base` é mutável.
            unsafe { merge(base.as_ptr(), extra.as_ptr(), std::ptr::null()) };
        }
        base
    }

    fn subscribe(&self, channels: &CfRef) -> Option<CfRef> {
        let api = self.api()?;
        let mut result: CFMutableDictionaryRef = std::ptr::null_mut();
        // SAFETY: dicionário de canais mutável e válido.
        let sub = unsafe {
            (api.create_subscription)(
                std::ptr::null(),
                channels.as_mut_ptr(),
                &mut result,
                0,
                std::ptr::null(),
            )
        };
        CfRef::owned(sub)
    }

    fn sample(&self, subscription: &CfRef, channels: &CfRef) -> Option<CfRef> {
        let api = self.api()?;
        // SAFETY: assinatura e canais criados por este provedor.
        CfRef::owned(unsafe {
            (api.create_samples)(subscription.as_ptr(), channels.as_mut_ptr(), std::ptr::null())
        })
    }

    fn delta(&self, previous: &CfRef, current: &CfRef) -> Vec<ChannelReading> {
        let Some(api) = self.api() else {
            return Vec::new();
        };
        let Some(create_delta) = api.create_samples_delta else {
            return Vec::new();
        };
        // SAFETY: amostras válidas deste provedor; o delta tem posse.
        let Some(delta) = CfRef::owned(unsafe {
            create_delta(previous.as_ptr(), current.as_ptr(), std::ptr::null())
        }) else {
            return Vec::new();
        };
        let Some(key) = ffi::cf_string("IOReportChannels") else {
            return Vec::new();
        };

        // SAFETY: dicionário válido; o array não tem posse.
        let channels = unsafe { ffi::CFDictionaryGetValue(delta.as_ptr(), key.as_ptr()) };
        if channels.is_null() {
            return Vec::new();
        }
        // SAFETY: `channels` é um CFArray mantido vivo por `delta`.
        let count = unsafe { ffi::CFArrayGetCount(channels) };
        (0..count)
            // SAFETY: índice dentro de [0, count).
            .map(|i| unsafe { ffi::CFArrayGetValueAtIndex(channels, i) })
            .filter(|ch| !ch.is_null())
            .map(|ch| api.reading(ch))
            .collect()
    }

    fn frequency_table_blob(&self) -> Option<Vec<u8>> {
        self.api()?;
        pmgr_voltage_states()
    }
}

/// Blob `voltage-states9` do dispositivo `pmgr` (frequências da GPU).
fn pmgr_voltage_states() -> Option<Vec<u8>> {
    let device = ffi::find_service(c"AppleARMIODevice", "pmgr")?;

    let mut props: CFMutableDictionaryRef = std::ptr::null_mut();
    // SAFETY: dispositivo válido; `props` recebe um dicionário com posse.
    let kr = unsafe { ffi::IORegistryEntryCreateCFProperties(device.0, &mut props, std::ptr::null(), 0) };
    if kr != ffi::KERN_SUCCESS {
        return None;
    }
    let props = CfRef::owned(props)?;
    let key = ffi::cf_string("voltage-states9")?;

    // SAFETY: dicionário válido; o CFData não tem posse e vive com `props`.
    let data = unsafe { ffi::CFDictionaryGetValue(props.as_ptr(), key.as_ptr()) };
    if data.is_null() {
        return None;
    }
    // SAFETY: `data` é um CFData válido de `len` bytes.
    let blob = unsafe {
        let len = ffi::CFDataGetLength(data);
        let ptr = ffi::CFDataGetBytePtr(data);
        if ptr.is_null() || len <= 0 {
            return None;
        }
        std::slice::from_raw_parts(ptr, len as usize).to_vec()
    };
    Some(blob)
}
