// This file is part of the fxt65-emu crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Host keycode to PS/2 Set-2 scancode translation (spec.md §4.7, §6).
//! `KeyCode` only contains keys that have a Set-2 mapping, so `translate`
//! returning `Option` is really only future-proofing the signature rather
//! than an escape hatch exercised today — every variant maps to `Some`.
//! This is a deliberate tightening of spec.md's "code 0 = unsupported"
//! convention (see DESIGN.md).

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyCode {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    Up, Down, Left, Right,
    Enter, Escape, Backspace, Tab, Space, CapsLock,
    LeftShift, RightShift, LeftCtrl, RightCtrl, LeftAlt, RightAlt,
    Home, End, PageUp, PageDown, Insert, Delete,
    Minus, Equals, LeftBracket, RightBracket, Backslash, Semicolon,
    Quote, Comma, Period, Slash, Grave,
    Numpad0, Numpad1, Numpad2, Numpad3, Numpad4,
    Numpad5, Numpad6, Numpad7, Numpad8, Numpad9,
    NumpadEnter, NumpadPlus, NumpadMinus, NumpadStar, NumpadSlash,
}

/// A PS/2 Set-2 scancode: `extended` is `true` when the code must be
/// prefixed with `0xE0` in the wire frame (spec.md §4.4).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScanCode {
    pub extended: bool,
    pub code: u8,
}

const fn sc(code: u8) -> ScanCode {
    ScanCode { extended: false, code }
}

const fn sc_ext(code: u8) -> ScanCode {
    ScanCode { extended: true, code }
}

pub fn translate(key: KeyCode) -> Option<ScanCode> {
    use KeyCode::*;
    Some(match key {
        A => sc(0x1C),
        B => sc(0x32),
        C => sc(0x21),
        D => sc(0x23),
        E => sc(0x24),
        F => sc(0x2B),
        G => sc(0x34),
        H => sc(0x33),
        I => sc(0x43),
        J => sc(0x3B),
        K => sc(0x42),
        L => sc(0x4B),
        M => sc(0x3A),
        N => sc(0x31),
        O => sc(0x44),
        P => sc(0x4D),
        Q => sc(0x15),
        R => sc(0x2D),
        S => sc(0x1B),
        T => sc(0x2C),
        U => sc(0x3C),
        V => sc(0x2A),
        W => sc(0x1D),
        X => sc(0x22),
        Y => sc(0x35),
        Z => sc(0x1A),
        Num0 => sc(0x45),
        Num1 => sc(0x16),
        Num2 => sc(0x1E),
        Num3 => sc(0x26),
        Num4 => sc(0x25),
        Num5 => sc(0x2E),
        Num6 => sc(0x36),
        Num7 => sc(0x3D),
        Num8 => sc(0x3E),
        Num9 => sc(0x46),
        F1 => sc(0x05),
        F2 => sc(0x06),
        F3 => sc(0x04),
        F4 => sc(0x0C),
        F5 => sc(0x03),
        F6 => sc(0x0B),
        F7 => sc(0x83),
        F8 => sc(0x0A),
        F9 => sc(0x01),
        F10 => sc(0x09),
        F11 => sc(0x78),
        F12 => sc(0x07),
        Up => sc_ext(0x75),
        Down => sc_ext(0x72),
        Left => sc_ext(0x6B),
        Right => sc_ext(0x74),
        Enter => sc(0x5A),
        Escape => sc(0x76),
        Backspace => sc(0x66),
        Tab => sc(0x0D),
        Space => sc(0x29),
        CapsLock => sc(0x58),
        LeftShift => sc(0x12),
        RightShift => sc(0x59),
        LeftCtrl => sc(0x14),
        RightCtrl => sc_ext(0x14),
        LeftAlt => sc(0x11),
        RightAlt => sc_ext(0x11),
        Home => sc_ext(0x6C),
        End => sc_ext(0x69),
        PageUp => sc_ext(0x7D),
        PageDown => sc_ext(0x7A),
        Insert => sc_ext(0x70),
        Delete => sc_ext(0x71),
        Minus => sc(0x4E),
        Equals => sc(0x55),
        LeftBracket => sc(0x54),
        RightBracket => sc(0x5B),
        Backslash => sc(0x5D),
        Semicolon => sc(0x4C),
        Quote => sc(0x52),
        Comma => sc(0x41),
        Period => sc(0x49),
        Slash => sc(0x4A),
        Grave => sc(0x0E),
        Numpad0 => sc(0x70),
        Numpad1 => sc(0x69),
        Numpad2 => sc(0x72),
        Numpad3 => sc(0x7A),
        Numpad4 => sc(0x6B),
        Numpad5 => sc(0x73),
        Numpad6 => sc(0x74),
        Numpad7 => sc(0x6C),
        Numpad8 => sc(0x75),
        Numpad9 => sc(0x7D),
        NumpadEnter => sc_ext(0x5A),
        NumpadPlus => sc(0x79),
        NumpadMinus => sc(0x7B),
        NumpadStar => sc(0x7C),
        NumpadSlash => sc_ext(0x4A),
    })
}
