//! Bindings mínimos de IOKit, CoreFoundation e Mach.

#![allow(non_upper_case_globals)]

use std::ffi::{CStr, CString, c_char, c_void};

pub type KernReturn = i32;
pub type MachPort = u32;
pub type IoObjectT = u32;
pub type CFIndex = isize;
pub type CFTypeRef = *const c_void;
pub type CFStringRef = *const c_void;
pub type CFDictionaryRef = *const c_void;
pub type CFMutableDictionaryRef = *mut c_void;
pub type CFArrayRef = *const c_void;
pub type CFDataRef = *const c_void;

pub const KERN_SUCCESS: KernReturn = 0;

/// `kIOMainPortDefault` é 0 no macOS moderno.
pub const IO_MAIN_PORT_DEFAULT: MachPort = 0;

pub const CF_STRING_ENCODING_UTF8: u32 = 0x0800_0100;
pub const CF_NUMBER_SINT32_TYPE: CFIndex = 3;

/// Layout opaco de `CFDictionaryKeyCallBacks`/`ValueCallBacks`; só o endereço é usado.
#[repr(C)]
pub struct CFDictionaryCallBacks {
    _private: [u8; 0],
}

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    pub fn IOServiceMatching(name: *const c_char) -> CFMutableDictionaryRef;
    pub fn IOServiceGetMatchingServices(
        main_port: MachPort,
        matching: CFDictionaryRef,
        existing: *mut IoObjectT,
    ) -> KernReturn;
    pub fn IOIteratorNext(iterator: IoObjectT) -> IoObjectT;
    pub fn IOObjectRelease(object: IoObjectT) -> KernReturn;
    pub fn IORegistryEntryGetName(entry: IoObjectT, name: *mut c_char) -> KernReturn;
    pub fn IORegistryEntryCreateCFProperties(
        entry: IoObjectT,
        properties: *mut CFMutableDictionaryRef,
        allocator: *const c_void,
        options: u32,
    ) -> KernReturn;
    pub fn IOServiceOpen(
        service: IoObjectT,
        owning_task: MachPort,
        kind: u32,
        connect: *mut IoObjectT,
    ) -> KernReturn;
    pub fn IOServiceClose(connect: IoObjectT) -> KernReturn;
    pub fn IOConnectCallStructMethod(
        connection: IoObjectT,
        selector: u32,
        input: *const c_void,
        input_size: usize,
        output: *mut c_void,
        output_size: *mut usize,
    ) -> KernReturn;

    // HID (privado, presente no IOKit.framework)
    pub fn IOHIDEventSystemClientCreate(allocator: *const c_void) -> *mut c_void;
    pub fn IOHIDEventSystemClientSetMatching(client: *mut c_void, matching: CFDictionaryRef);
    pub fn IOHIDEventSystemClientCopyServices(client: *mut c_void) -> CFArrayRef;
    pub fn IOHIDServiceClientCopyProperty(service: *const c_void, key: CFStringRef) -> CFTypeRef;
    pub fn IOHIDServiceClientCopyEvent(
        service: *const c_void,
        kind: i64,
        options: i32,
        timestamp: i64,
    ) -> *const c_void;
    pub fn IOHIDEventGetFloatValue(event: *const c_void, field: i32) -> f64;
}

#[link(name = "CoreFoundation", kind = "framework")]
unsafe extern "C" {
    pub static kCFTypeDictionaryKeyCallBacks: CFDictionaryCallBacks;
    pub static kCFTypeDictionaryValueCallBacks: CFDictionaryCallBacks;

    pub fn CFRelease(cf: CFTypeRef);
    pub fn CFStringCreateWithCString(
        alloc: *const c_void,
        c_str: *const c_char,
        encoding: u32,
    ) -> CFStringRef;
    pub fn CFStringGetCString(
        s: CFStringRef,
        buffer: *mut c_char,
        size: CFIndex,
        encoding: u32,
    ) -> u8;
    pub fn CFNumberCreate(
        alloc: *const c_void,
        kind: CFIndex,
        value: *const c_void,
    ) -> CFTypeRef;
    pub fn CFDictionaryCreate(
        alloc: *const c_void,
        keys: *const *const c_void,
        values: *const *const c_void,
        count: CFIndex,
        key_callbacks: *const CFDictionaryCallBacks,
        value_callbacks: *const CFDictionaryCallBacks,
    ) -> CFDictionaryRef;
    pub fn CFDictionaryCreateMutableCopy(
        alloc: *const c_void,
        capacity: CFIndex,
        dict: CFDictionaryRef,
    ) -> CFMutableDictionaryRef;
    pub fn CFDictionaryGetCount(dict: CFDictionaryRef) -> CFIndex;
    pub fn CFDictionaryGetValue(dict: CFDictionaryRef, key: *const c_void) -> *const c_void;
    pub fn CFArrayGetCount(array: CFArrayRef) -> CFIndex;
    pub fn CFArrayGetValueAtIndex(array: CFArrayRef, index: CFIndex) -> *const c_void;
    pub fn CFDataGetLength(data: CFDataRef) -> CFIndex;
    pub fn CFDataGetBytePtr(data: CFDataRef) -> *const u8;
}

unsafe extern "C" {
    pub static mach_task_self_: MachPort;
    pub fn mach_host_self() -> MachPort;
    pub fn host_statistics(
        host: MachPort,
        flavor: i32,
        info: *mut i32,
        count: *mut u32,
    ) -> KernReturn;
}

// ──────────────────────────────────────────────
// RAII
// ──────────────────────────────────────────────

/// Objeto CoreFoundation com posse (liberado no drop).
pub struct CfRef(CFTypeRef);

impl CfRef {
    /// Assume a posse de `ptr` (regra "Create/Copy"). `None` se nulo.
    pub fn owned(ptr: CFTypeRef) -> Option<Self> {
        (!ptr.is_null()).then_some(Self(ptr))
    }

    pub fn as_ptr(&self) -> CFTypeRef {
        self.0
    }

    pub fn as_mut_ptr(&self) -> CFMutableDictionaryRef {
        self.0 as CFMutableDictionaryRef
    }
}

impl Drop for CfRef {
    fn drop(&mut self) {
        // SAFETY: `self.0` é não nulo e foi obtido de uma função Create/Copy.
        unsafe { CFRelease(self.0) };
    }
}

/// Handle IOKit com posse (liberado no drop).
pub struct IoObject(pub IoObjectT);

impl Drop for IoObject {
    fn drop(&mut self) {
        if self.0 != 0 {
            // SAFETY: handle obtido de IOIteratorNext/IOServiceGetMatchingServices.
            unsafe { IOObjectRelease(self.0) };
        }
    }
}

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

/// Cria uma CFString a partir de `&str`.
pub fn cf_string(s: &str) -> Option<CfRef> {
    let c = CString::new(s).ok()?;
    // SAFETY: `c` é terminada em nulo e vive até o fim da chamada.
    let ptr = unsafe { CFStringCreateWithCString(std::ptr::null(), c.as_ptr(), CF_STRING_ENCODING_UTF8) };
    CfRef::owned(ptr)
}

/// Copia uma CFString (sem posse) para `String`.
pub fn string_from_cf(s: CFStringRef) -> Option<String> {
    if s.is_null() {
        return None;
    }
    let mut buf = [0 as c_char; 256];
    // SAFETY: `buf` tem o tamanho informado; CFStringGetCString termina em nulo.
    let ok = unsafe { CFStringGetCString(s, buf.as_mut_ptr(), buf.len() as CFIndex, CF_STRING_ENCODING_UTF8) };
    if ok == 0 {
        return None;
    }
    // SAFETY: sucesso garante string terminada em nulo dentro de `buf`.
    let cstr = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Some(cstr.to_string_lossy().into_owned())
}

/// Nome do registro IOKit de uma entrada.
pub fn registry_name(entry: IoObjectT) -> String {
    let mut name = [0 as c_char; 128];
    // SAFETY: `io_name_t` tem 128 bytes.
    let kr = unsafe { IORegistryEntryGetName(entry, name.as_mut_ptr()) };
    if kr != KERN_SUCCESS {
        return String::new();
    }
    // SAFETY: IORegistryEntryGetName escreve uma string terminada em nulo.
    unsafe { CStr::from_ptr(name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Primeiro serviço da classe `class` cujo nome de registro é `name`.
pub fn find_service(class: &CStr, name: &str) -> Option<IoObject> {
    // SAFETY: IOServiceMatching recebe uma C string válida.
    let matching = unsafe { IOServiceMatching(class.as_ptr()) };
    if matching.is_null() {
        return None;
    }

    let mut iter: IoObjectT = 0;
    // SAFETY: consome `matching` mesmo em falha; escreve o iterador em `iter`.
    let kr = unsafe { IOServiceGetMatchingServices(IO_MAIN_PORT_DEFAULT, matching, &mut iter) };
    if kr != KERN_SUCCESS || iter == 0 {
        return None;
    }
    let iter = IoObject(iter);

    loop {
        // SAFETY: iterador válido; 0 indica o fim.
        let entry = unsafe { IOIteratorNext(iter.0) };
        if entry == 0 {
            return None;
        }
        let entry = IoObject(entry);
        if registry_name(entry.0) == name {
            return Some(entry);
        }
    }
}

/// Porta da task atual (`mach_task_self()` é uma macro sobre esta global).
pub fn task_self() -> MachPort {
    // SAFETY: global inicializada pelo runtime antes de `main`.
    unsafe { mach_task_self_ }
}
