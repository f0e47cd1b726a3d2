//! ARMv4 (ARM state) flash routines
//!
//! Status polling treats bit 7 as ready and bits 0-6 as errors, which is the
//! Intel/Sharp status register layout.

use super::{Algorithm, AlgorithmSet};

/// Block write, 32-bit bus
pub const WRITE_32: Algorithm = Algorithm {
    name: "armv4-write32",
    code: &[
        0xe4904004, // loop: ldr  r4, [r0], #4
        0xe5813000, //       str  r3, [r1]
        0xe5814000, //       str  r4, [r1]
        0xe5914000, // busy: ldr  r4, [r1]
        0xe3140080, //       tst  r4, #0x80
        0x0afffffc, //       beq  busy
        0xe314007f, //       tst  r4, #0x7f
        0x1a000003, //       bne  done
        0xe2522001, //       subs r2, r2, #1
        0x0a000001, //       beq  done
        0xe2811004, //       add  r1, r1, #4
        0xeafffff3, //       b    loop
        0xeafffffe, // done: b    done
    ],
    exit_offset: 12 * 4,
};

/// Block write, 16-bit bus
pub const WRITE_16: Algorithm = Algorithm {
    name: "armv4-write16",
    code: &[
        0xe0d040b2, // loop: ldrh r4, [r0], #2
        0xe1c130b0, //       strh r3, [r1]
        0xe1c140b0, //       strh r4, [r1]
        0xe1d140b0, // busy: ldrh r4, [r1]
        0xe3140080, //       tst  r4, #0x80
        0x0afffffc, //       beq  busy
        0xe314007f, //       tst  r4, #0x7f
        0x1a000003, //       bne  done
        0xe2522001, //       subs r2, r2, #1
        0x0a000001, //       beq  done
        0xe2811002, //       add  r1, r1, #2
        0xeafffff3, //       b    loop
        0xeafffffe, // done: b    done
    ],
    exit_offset: 12 * 4,
};

/// Block write, 8-bit bus
pub const WRITE_8: Algorithm = Algorithm {
    name: "armv4-write8",
    code: &[
        0xe4d04001, // loop: ldrb r4, [r0], #1
        0xe5c13000, //       strb r3, [r1]
        0xe5c14000, //       strb r4, [r1]
        0xe5d14000, // busy: ldrb r4, [r1]
        0xe3140080, //       tst  r4, #0x80
        0x0afffffc, //       beq  busy
        0xe314007f, //       tst  r4, #0x7f
        0x1a000003, //       bne  done
        0xe2522001, //       subs r2, r2, #1
        0x0a000001, //       beq  done
        0xe2811001, //       add  r1, r1, #1
        0xeafffff3, //       b    loop
        0xeafffffe, // done: b    done
    ],
    exit_offset: 12 * 4,
};

/// AND-reduce `r1` bytes starting at `r0` into `r2`
pub const ERASE_CHECK: Algorithm = Algorithm {
    name: "armv4-erase-check",
    code: &[
        0xe4d03001, // loop: ldrb r3, [r0], #1
        0xe0022003, //       and  r2, r2, r3
        0xe2511001, //       subs r1, r1, #1
        0x1afffffb, //       bne  loop
        0xeafffffe, // done: b    done
    ],
    exit_offset: 4 * 4,
};

/// All ARMv4 routines
pub const ALGORITHMS: AlgorithmSet = AlgorithmSet {
    arch: "armv4",
    write_8: WRITE_8,
    write_16: WRITE_16,
    write_32: WRITE_32,
    erase_check: ERASE_CHECK,
};
